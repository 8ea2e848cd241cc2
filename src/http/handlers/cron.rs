//! Scheduler-triggered jobs, guarded by the cron secret

use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::AppState;
use crate::http::error::AppError;
use crate::investment::rrp::{self, RrpBackfillReport};
use crate::investment::training::{self, TrainingSummary};
use crate::services::fees::{FeeBackfillReport, BACKFILL_BATCH};
use crate::services::sync::SyncReport;
use crate::store::Platform;

pub async fn ebay_orders(State(state): State<AppState>) -> Result<Json<SyncReport>, AppError> {
    Ok(Json(state.order_sync.run().await?))
}

pub async fn fee_backfill(
    State(state): State<AppState>,
) -> Result<Json<FeeBackfillReport>, AppError> {
    Ok(Json(state.fee_backfill.run(BACKFILL_BATCH).await?))
}

#[derive(Debug, Default, Serialize)]
pub struct NegotiationRun {
    pub users: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_users: usize,
}

pub async fn negotiation(State(state): State<AppState>) -> Result<Json<NegotiationRun>, AppError> {
    let users = state.credentials.users_with_platform(Platform::Ebay).await?;
    let mut run = NegotiationRun::default();

    for user_id in users {
        run.users += 1;
        match state.negotiation.send(user_id).await {
            Ok(report) => {
                run.sent += report.sent;
                run.skipped += report.skipped;
                run.failed += report.failed;
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Offer run failed");
                run.failed_users += 1;
            }
        }
    }

    info!(users = run.users, sent = run.sent, failed_users = run.failed_users, "Offer cron finished");
    Ok(Json(run))
}

pub async fn investment_training(
    State(state): State<AppState>,
) -> Result<Json<TrainingSummary>, AppError> {
    Ok(Json(training::rebuild(&state.market, &state.predictions).await?))
}

pub async fn rrp_backfill(State(state): State<AppState>) -> Result<Json<RrpBackfillReport>, AppError> {
    Ok(Json(rrp::backfill(&state.market).await?))
}
