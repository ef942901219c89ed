use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::SystemConfig;
use crate::handlers;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let system_config = &state.config.system_config;
    let body_limit = DefaultBodyLimit::max(system_config.max_upload_bytes);
    let cors = cors_layer(system_config);

    Router::new()
        // Health check
        .route("/", get(root))
        .route("/health", get(health_check))

        // Prescription OCR + translation
        .route("/upload", post(handlers::upload))
        .route("/translate", post(handlers::translate_slots))
        .route("/image/:filename", get(handlers::get_image))

        // Session medicines
        .route("/session/extract", post(handlers::session_extract))
        .route(
            "/session/:session_id",
            get(handlers::get_session)
                .put(handlers::put_session)
                .delete(handlers::delete_session),
        )
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Allow-list of frontend origins with credentials; permissive when the list
/// is empty.
fn cors_layer(system_config: &SystemConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = system_config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true)
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mocked": state.prescriptions.is_mocked(),
        "fallback_enabled": state.prescriptions.fallback_enabled(),
    }))
}
