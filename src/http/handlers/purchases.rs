//! Purchase ledger CRUD

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{non_blank, PageParams, Paged};
use crate::app::AppState;
use crate::http::error::{ApiJson, ApiQuery, AppError};
use crate::http::middleware::AuthenticatedUser;
use crate::store::purchases::{NewPurchase, Purchase, PurchaseUpdate};

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(page): ApiQuery<PageParams>,
) -> Result<Json<Paged<Purchase>>, AppError> {
    let (number, size, offset) = page.resolve()?;
    let rows = state.purchases.list(auth.user_id, offset, size).await?;
    Ok(Json(Paged::new(rows, number, size)))
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequest {
    pub purchase_date: NaiveDate,
    pub short_description: String,
    pub cost: f64,
    pub source: Option<String>,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

fn check_cost(cost: f64) -> Result<(), AppError> {
    if !cost.is_finite() || cost < 0.0 {
        return Err(AppError::BadRequest(
            "cost must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

impl CreatePurchaseRequest {
    fn into_new(self, user_id: Uuid) -> Result<NewPurchase, AppError> {
        let short_description = non_blank(Some(self.short_description))
            .ok_or_else(|| AppError::BadRequest("short_description is required".to_string()))?;
        check_cost(self.cost)?;
        Ok(NewPurchase {
            user_id,
            purchase_date: self.purchase_date,
            short_description,
            cost: self.cost,
            source: non_blank(self.source),
            payment_method: non_blank(self.payment_method),
            reference: non_blank(self.reference),
            notes: self.notes,
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<CreatePurchaseRequest>,
) -> Result<Response, AppError> {
    let purchase = state.purchases.create(&req.into_new(auth.user_id)?).await?;
    info!(user_id = %auth.user_id, purchase_id = %purchase.id, "Purchase recorded");
    Ok((StatusCode::CREATED, Json(purchase)).into_response())
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Purchase>, AppError> {
    state
        .purchases
        .get(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Purchase"))
}

fn validate_update(update: &PurchaseUpdate) -> Result<(), AppError> {
    let untouched = update.purchase_date.is_none()
        && update.short_description.is_none()
        && update.cost.is_none()
        && update.source.is_none()
        && update.payment_method.is_none()
        && update.reference.is_none()
        && update.notes.is_none();
    if untouched {
        return Err(AppError::BadRequest("no fields to update".to_string()));
    }
    if update
        .short_description
        .as_deref()
        .is_some_and(|d| d.trim().is_empty())
    {
        return Err(AppError::BadRequest(
            "short_description cannot be blank".to_string(),
        ));
    }
    if let Some(cost) = update.cost {
        check_cost(cost)?;
    }
    Ok(())
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    ApiJson(update): ApiJson<PurchaseUpdate>,
) -> Result<Json<Purchase>, AppError> {
    validate_update(&update)?;
    state
        .purchases
        .update(auth.user_id, id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Purchase"))
}

#[derive(Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Deleted>, AppError> {
    state
        .purchases
        .get(auth.user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Purchase"))?;

    let linked = state
        .inventory
        .count_for_purchase(auth.user_id, id)
        .await?;
    if linked > 0 {
        return Err(AppError::Conflict(format!(
            "purchase has {} linked inventory items",
            linked
        )));
    }

    state.purchases.delete(auth.user_id, id).await?;
    info!(user_id = %auth.user_id, purchase_id = %id, "Purchase deleted");
    Ok(Json(Deleted { deleted: true }))
}
