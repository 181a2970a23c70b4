//! JSON HTTP adapter.
//!
//! Every route lives under `/api` and hands its request to one domain
//! operation against the shared [`IndexStore`].

mod error;
mod handlers;

pub use error::{WebError, status_from_error};
pub use handlers::*;

use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::domain::settings::Settings;
use crate::ports::store_port::IndexStore;

pub struct AppState {
    pub store: Arc<dyn IndexStore>,
    pub settings: Settings,
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.web.cors_origins);
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/indices", get(handlers::list_indices))
        .route("/indices/{id}", delete(handlers::delete_index))
        .route("/indices/{id}/stocks", get(handlers::index_stocks))
        .route("/setup/master-config", post(handlers::upload_master_config))
        .route("/setup/upload-index", post(handlers::upload_index))
        .route("/setup/bulk-upload", post(handlers::bulk_upload))
        .route(
            "/setup/process-tradingview-alerts",
            post(handlers::process_tradingview_alerts),
        )
        .route("/analysis/common-stocks", post(handlers::common_stocks))
        .route("/search/stock-indices", get(handlers::search_stock_indices));

    Router::new()
        .nest("/api", api)
        .fallback(handlers::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(Arc::new(state))
}

/// No origins configured, or `*` among them, allows any origin.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
