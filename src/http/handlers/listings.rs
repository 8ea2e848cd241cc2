//! Listing rows and the SSE creation/refresh workflows

use std::convert::Infallible;

use axum::{
    extract::{Extension, Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::info;
use uuid::Uuid;

use super::{PageParams, Paged};
use crate::app::AppState;
use crate::http::error::{ApiJson, ApiQuery, AppError};
use crate::http::middleware::AuthenticatedUser;
use crate::listing::{CreateListingRequest, WorkflowEvent};
use crate::store::listings::{Listing, ListingStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<ListingStatus>,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiQuery(page): ApiQuery<PageParams>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Paged<Listing>>, AppError> {
    let (number, size, offset) = page.resolve()?;
    let rows = state
        .listings
        .list(auth.user_id, params.status, offset, size)
        .await?;
    Ok(Json(Paged::new(rows, number, size)))
}

fn event_stream(
    events: impl Stream<Item = WorkflowEvent> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(events.map(|event| Ok(event.into_sse()))).keep_alive(KeepAlive::default())
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    ApiJson(req): ApiJson<CreateListingRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    req.validate().map_err(AppError::BadRequest)?;
    info!(
        user_id = %auth.user_id,
        item_id = %req.inventory_item_id,
        "Starting listing creation"
    );
    Ok(event_stream(state.workflow.start_create(auth.user_id, req)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    state
        .listings
        .get(auth.user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Listing"))?;
    info!(user_id = %auth.user_id, listing_id = %id, "Starting listing refresh");
    Ok(event_stream(state.workflow.start_refresh(auth.user_id, id)))
}
