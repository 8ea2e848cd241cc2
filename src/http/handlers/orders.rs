//! Synced marketplace orders

use axum::{
    extract::{Extension, Path, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{non_blank, PageParams, Paged};
use crate::app::AppState;
use crate::http::error::{ApiQuery, AppError};
use crate::http::middleware::AuthenticatedUser;
use crate::store::orders::{OrderWithItems, PlatformOrder};
use crate::store::Platform;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub platform: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Paged<PlatformOrder>>, AppError> {
    let (number, size, offset) = page.resolve()?;
    let platform = non_blank(params.platform)
        .map(|p| p.parse::<Platform>())
        .transpose()
        .map_err(AppError::BadRequest)?;
    let rows = state
        .orders
        .list(auth.user_id, platform, offset, size)
        .await?;
    Ok(Json(Paged::new(rows, number, size)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, AppError> {
    state
        .orders
        .get_with_items(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Order"))
}
