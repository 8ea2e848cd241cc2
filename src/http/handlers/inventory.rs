//! Inventory CRUD, status transitions, SKU issues and CSV export

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{csv_attachment, non_blank, PageParams, Paged};
use crate::app::AppState;
use crate::http::error::{ApiJson, ApiQuery, AppError};
use crate::http::middleware::AuthenticatedUser;
use crate::services::sku_issues::{self, SkuIssueReport};
use crate::store::inventory::{
    InventoryFilter, InventoryItem, InventoryStatus, InventoryUpdate, ItemCondition,
    NewInventoryItem, StatusChange,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub platform: Option<String>,
    pub search: Option<String>,
}

impl ListParams {
    fn into_filter(self) -> Result<InventoryFilter, AppError> {
        let status = non_blank(self.status)
            .map(|s| s.parse::<InventoryStatus>())
            .transpose()
            .map_err(AppError::BadRequest)?;
        Ok(InventoryFilter {
            status,
            platform: non_blank(self.platform),
            search: non_blank(self.search),
        })
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Paged<InventoryItem>>, AppError> {
    let (number, size, offset) = page.resolve()?;
    let filter = params.into_filter()?;
    let rows = state
        .inventory
        .list(auth.user_id, &filter, offset, size)
        .await?;
    Ok(Json(Paged::new(rows, number, size)))
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub sku: Option<String>,
    pub set_number: Option<String>,
    pub item_name: Option<String>,
    pub condition: Option<ItemCondition>,
    pub status: Option<InventoryStatus>,
    pub cost: Option<f64>,
    pub listing_value: Option<f64>,
    pub listing_platform: Option<String>,
    pub storage_location: Option<String>,
    pub purchase_id: Option<Uuid>,
    pub amazon_asin: Option<String>,
    pub notes: Option<String>,
}

fn check_money(field: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(AppError::BadRequest(format!(
            "{} must be a non-negative number",
            field
        ))),
        _ => Ok(()),
    }
}

impl CreateItemRequest {
    fn into_new(self, user_id: Uuid) -> Result<NewInventoryItem, AppError> {
        let set_number = non_blank(self.set_number);
        let item_name = non_blank(self.item_name);
        if set_number.is_none() && item_name.is_none() {
            return Err(AppError::BadRequest(
                "set_number or item_name is required".to_string(),
            ));
        }
        check_money("cost", self.cost)?;
        check_money("listing_value", self.listing_value)?;

        let status = self.status.unwrap_or(InventoryStatus::Backlog);
        if matches!(status, InventoryStatus::Sold | InventoryStatus::Returned) {
            return Err(AppError::BadRequest(format!(
                "new items cannot start as {}",
                status
            )));
        }

        Ok(NewInventoryItem {
            user_id,
            sku: non_blank(self.sku),
            set_number,
            item_name,
            condition: self.condition,
            status,
            cost: self.cost,
            listing_value: self.listing_value,
            listing_platform: non_blank(self.listing_platform),
            storage_location: non_blank(self.storage_location),
            purchase_id: self.purchase_id,
            amazon_asin: non_blank(self.amazon_asin),
            notes: self.notes,
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<CreateItemRequest>,
) -> Result<Response, AppError> {
    let new_item = req.into_new(auth.user_id)?;
    if let Some(purchase_id) = new_item.purchase_id {
        state
            .purchases
            .get(auth.user_id, purchase_id)
            .await?
            .ok_or_else(|| AppError::not_found("Purchase"))?;
    }

    let item = state.inventory.create(&new_item).await?;
    info!(user_id = %auth.user_id, item_id = %item.id, "Inventory item created");
    Ok((StatusCode::CREATED, Json(item)).into_response())
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<InventoryItem>, AppError> {
    state
        .inventory
        .get(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Inventory item"))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    ApiJson(update): ApiJson<InventoryUpdate>,
) -> Result<Json<InventoryItem>, AppError> {
    if update.is_empty() {
        return Err(AppError::BadRequest("no fields to update".to_string()));
    }
    check_money("cost", update.cost)?;
    check_money("listing_value", update.listing_value)?;

    state
        .inventory
        .update(auth.user_id, id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Inventory item"))
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
    if !state.inventory.soft_delete(auth.user_id, id).await? {
        return Err(AppError::not_found("Inventory item"));
    }
    info!(user_id = %auth.user_id, item_id = %id, "Inventory item deleted");
    Ok(Json(Deleted { deleted: true }))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: InventoryStatus,
    pub sold_date: Option<NaiveDate>,
    pub sold_price: Option<f64>,
}

/// The change to write, or why the transition is refused
pub fn plan_transition(
    current: InventoryStatus,
    req: &StatusRequest,
    today: NaiveDate,
) -> Result<StatusChange, AppError> {
    if !current.can_transition_to(req.status) {
        return Err(AppError::Conflict(format!(
            "cannot move from {} to {}",
            current, req.status
        )));
    }
    check_money("sold_price", req.sold_price)?;

    let sold = req.status == InventoryStatus::Sold;
    Ok(StatusChange {
        status: req.status,
        sold_date: sold.then(|| req.sold_date.unwrap_or(today)),
        sold_price: if sold { req.sold_price } else { None },
        updated_at: Utc::now(),
    })
}

pub async fn transition(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<StatusRequest>,
) -> Result<Json<InventoryItem>, AppError> {
    let item = state
        .inventory
        .get(auth.user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Inventory item"))?;

    let change = plan_transition(item.status, &req, Utc::now().date_naive())?;
    let updated = state
        .inventory
        .set_status(auth.user_id, id, &change)
        .await?
        .ok_or_else(|| AppError::not_found("Inventory item"))?;

    info!(
        user_id = %auth.user_id,
        item_id = %id,
        from = %item.status,
        to = %updated.status,
        "Inventory status changed"
    );
    Ok(Json(updated))
}

pub async fn sku_issues(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<SkuIssueReport>, AppError> {
    let report = sku_issues::scan(&state.inventory, &state.listings, auth.user_id).await?;
    Ok(Json(report))
}

pub async fn export(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Response, AppError> {
    let body = state.reports.inventory_csv(auth.user_id).await?;
    Ok(csv_attachment("inventory.csv", body))
}
