//! Dashboard summary and profit/loss reports

use axum::{
    extract::{Extension, State},
    response::{Json, Response},
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;

use super::csv_attachment;
use crate::app::AppState;
use crate::http::error::{ApiQuery, AppError};
use crate::http::middleware::AuthenticatedUser;
use crate::services::reports::{profit_loss_csv, ProfitLoss, Summary};

const MIN_YEAR: i32 = 2000;
const MAX_YEAR: i32 = 2100;

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Defaults to month-to-date
pub fn resolve_range(params: &RangeParams, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), AppError> {
    let to = params.to.unwrap_or(today);
    let from = params
        .from
        .unwrap_or_else(|| to.with_day(1).unwrap_or(to));
    if from > to {
        return Err(AppError::BadRequest("from must not be after to".to_string()));
    }
    Ok((from, to))
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(params): ApiQuery<RangeParams>,
) -> Result<Json<Summary>, AppError> {
    let (from, to) = resolve_range(&params, Utc::now().date_naive())?;
    let summary = state.reports.summary(auth.user_id, from, to).await?;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct YearParams {
    pub year: Option<i32>,
}

fn resolve_year(params: &YearParams) -> Result<i32, AppError> {
    let year = params.year.unwrap_or_else(|| Utc::now().year());
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(AppError::BadRequest(format!("year {} is out of range", year)));
    }
    Ok(year)
}

pub async fn profit_loss(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(params): ApiQuery<YearParams>,
) -> Result<Json<ProfitLoss>, AppError> {
    let year = resolve_year(&params)?;
    Ok(Json(state.reports.profit_loss(auth.user_id, year).await?))
}

pub async fn profit_loss_export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(params): ApiQuery<YearParams>,
) -> Result<Response, AppError> {
    let year = resolve_year(&params)?;
    let report = state.reports.profit_loss(auth.user_id, year).await?;
    let body = profit_loss_csv(&report)?;
    Ok(csv_attachment(&format!("profit-loss-{}.csv", year), body))
}
