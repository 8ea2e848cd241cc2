//! HTTP route definitions

use std::time::Duration;

use axum::{
    http::{header, HeaderName, Method},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use super::handlers::{
    cron, inventory, investment, listings, negotiation, orders, purchases, reports,
};
use super::middleware::{require_auth, require_cron, API_KEY_HEADER};
use crate::app::AppState;
use crate::util::time::uptime_secs;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// SSE workflows and cron jobs walk many upstream calls
const LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .allow_credentials(true);

    let api_routes = Router::new()
        .route("/inventory", get(inventory::list).post(inventory::create))
        .route("/inventory/sku-issues", get(inventory::sku_issues))
        .route("/inventory/export", get(inventory::export))
        .route(
            "/inventory/:id",
            get(inventory::get)
                .patch(inventory::update)
                .delete(inventory::delete),
        )
        .route("/inventory/:id/status", post(inventory::transition))
        .route("/purchases", get(purchases::list).post(purchases::create))
        .route(
            "/purchases/:id",
            get(purchases::get)
                .patch(purchases::update)
                .delete(purchases::delete),
        )
        .route("/orders", get(orders::list))
        .route("/orders/:id", get(orders::get))
        .route("/listings", get(listings::list))
        .route("/reports/summary", get(reports::summary))
        .route("/reports/profit-loss", get(reports::profit_loss))
        .route("/reports/profit-loss/export", get(reports::profit_loss_export))
        .route("/negotiation/preview", get(negotiation::preview))
        .route("/negotiation/send", post(negotiation::send))
        .route("/investment/predictions", get(investment::predictions))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT));

    let stream_routes = Router::new()
        .route("/listings/create", post(listings::create))
        .route("/listings/:id/refresh", post(listings::refresh))
        .layer(TimeoutLayer::new(LONG_TIMEOUT));

    let protected_routes = api_routes
        .merge(stream_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cron_routes = Router::new()
        .route("/ebay-orders", post(cron::ebay_orders))
        .route("/fee-backfill", post(cron::fee_backfill))
        .route("/negotiation", post(cron::negotiation))
        .route("/investment-training", post(cron::investment_training))
        .route("/rrp-backfill", post(cron::rrp_backfill))
        .layer(TimeoutLayer::new(LONG_TIMEOUT))
        .layer(middleware::from_fn_with_state(state.clone(), require_cron));

    // Predictions are shared catalogue data, so only the pipeline may write them
    let pipeline_routes = Router::new()
        .route("/investment/score", post(investment::score))
        .layer(TimeoutLayer::new(LONG_TIMEOUT))
        .layer(middleware::from_fn_with_state(state.clone(), require_cron));

    Router::new()
        .route("/health", get(health_handler))
        .nest(
            "/api",
            protected_routes
                .merge(pipeline_routes)
                .nest("/cron", cron_routes),
        )
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime_secs(),
    })
}
