//! Watcher offer preview and send

use axum::{
    extract::{Extension, State},
    response::Json,
};

use crate::app::AppState;
use crate::http::error::AppError;
use crate::http::middleware::AuthenticatedUser;
use crate::services::negotiation::{OfferPreview, SendReport};

pub async fn preview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<OfferPreview>>, AppError> {
    Ok(Json(state.negotiation.preview(auth.user_id).await?))
}

pub async fn send(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Result<Json<SendReport>, AppError> {
    Ok(Json(state.negotiation.send(auth.user_id).await?))
}
