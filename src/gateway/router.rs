//! HTTP router and handlers

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Request, State},
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;

use super::handler::GatewayHandler;

/// Shared application state
pub struct AppState {
    /// Validation pipeline
    pub handler: GatewayHandler,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Registered before the catch-all, so it shadows an application named `healthz`
        .route("/healthz", get(health_handler))
        .route("/{application}", any(application_handler))
        .route("/{application}/{*rest}", any(application_handler))
        .fallback(fallback_handler)
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}

/// GET /healthz
async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Any request under `/{application}`
async fn application_handler(
    State(state): State<Arc<AppState>>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
) -> Response {
    validate_and_forward(&state, params.get("application").map(String::as_str), request).await
}

/// Requests without an application segment
async fn fallback_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    validate_and_forward(&state, None, request).await
}

async fn validate_and_forward(
    state: &AppState,
    application: Option<&str>,
    request: Request,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let path = request.uri().path().to_owned();

    match state.handler.handle(application, request, client).await {
        Ok(response) => response,
        Err(e) => {
            warn!(
                application = application.unwrap_or_default(),
                path = %path,
                kind = ?e.kind(),
                error = %e,
                "Request rejected"
            );
            e.into_response()
        }
    }
}
