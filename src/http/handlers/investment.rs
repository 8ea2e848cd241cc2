//! Investment predictions: ranked listing and batch scoring

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::http::error::{ApiJson, ApiQuery, AppError};
use crate::investment::scoring::{score_and_store, ScoreInput};
use crate::store::predictions::InvestmentPrediction;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;
const MAX_BATCH: usize = 2000;

#[derive(Debug, Default, Deserialize)]
pub struct PredictionParams {
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

pub async fn predictions(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<PredictionParams>,
) -> Result<Json<Vec<InvestmentPrediction>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let rows = state.predictions.list(params.min_score, limit).await?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub sets: Vec<ScoreInput>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub scored: usize,
    pub predictions: Vec<InvestmentPrediction>,
}

fn validate(req: &ScoreRequest) -> Result<(), AppError> {
    if req.sets.is_empty() {
        return Err(AppError::BadRequest("sets must not be empty".to_string()));
    }
    if req.sets.len() > MAX_BATCH {
        return Err(AppError::BadRequest(format!(
            "at most {} sets per request",
            MAX_BATCH
        )));
    }
    if let Some(bad) = req
        .sets
        .iter()
        .find(|s| s.set_num.trim().is_empty() || !s.rrp_gbp.is_finite() || s.rrp_gbp <= 0.0)
    {
        return Err(AppError::BadRequest(format!(
            "set {:?} needs a set number and a positive rrp_gbp",
            bad.set_num
        )));
    }
    Ok(())
}

pub async fn score(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ScoreRequest>,
) -> Result<Json<ScoreResponse>, AppError> {
    validate(&req)?;
    let predictions = score_and_store(&state.market, &state.predictions, &req.sets).await?;
    Ok(Json(ScoreResponse {
        scored: predictions.len(),
        predictions,
    }))
}
