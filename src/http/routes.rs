//! HTTP route definitions

use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.client_origin.as_deref());

    let health = Router::new()
        .route("/health", get(health_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(5)));

    Router::new()
        .merge(health)
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured origins (comma-separated), permissive when unset
fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    let Some(origins) = client_origin else {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::OPTIONS]);
    };

    let allowed_origins: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    running: bool,
    paused: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let (status, running, paused) = match state.engine.snapshot().await {
        Ok(snapshot) => ("ok", snapshot.running, snapshot.paused),
        Err(e) => {
            warn!(error = %e, "Health check could not reach engine");
            ("degraded", false, false)
        }
    };

    Json(HealthResponse {
        status,
        uptime_secs: uptime_secs(),
        connections: state.registry.len(),
        running,
        paused,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::{EngineCommand, LifecycleRequest, MovementPolicy};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_health(app: Router) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_engine_state() {
        let (state, engine) = AppState::new(Config::for_tests(MovementPolicy::Grid));
        let handle = state.engine.clone();
        let task = tokio::spawn(engine.run());

        handle
            .send(EngineCommand::Lifecycle(LifecycleRequest::Start))
            .await
            .unwrap();
        let (status, body) = get_health(build_router(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["running"], true);
        assert_eq!(body["connections"], 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn health_is_degraded_without_engine() {
        let (state, engine) = AppState::new(Config::for_tests(MovementPolicy::Continuous));
        drop(engine);
        let (status, body) = get_health(build_router(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }
}
