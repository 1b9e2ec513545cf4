use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

pub struct HealthState {
    pub registry: Arc<Registry>,
    /// Flipped once the HTTPS listener is bound.
    pub ready: Arc<AtomicBool>,
}

pub type SharedHealthState = Arc<HealthState>;

pub fn health_router(state: SharedHealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<SharedHealthState>) -> impl IntoResponse {
    if state.ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "webhook listener not bound")
    }
}

async fn metrics_handler(State(state): State<SharedHealthState>) -> impl IntoResponse {
    let mut buffer = String::new();
    match encode(&mut buffer, &state.registry) {
        Ok(()) => (
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            buffer,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::metrics::InjectorMetrics;

    fn state(ready: bool) -> SharedHealthState {
        let mut registry = Registry::default();
        let metrics = InjectorMetrics::new(&mut registry);
        metrics.record_response(true);
        Arc::new(HealthState {
            registry: Arc::new(registry),
            ready: Arc::new(AtomicBool::new(ready)),
        })
    }

    async fn get_path(state: SharedHealthState, path: &str) -> (StatusCode, String) {
        let response = health_router(state)
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn readyz_follows_listener_flag() {
        let (status, _) = get_path(state(false), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = get_path(state(true), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn metrics_are_exposed_as_openmetrics() {
        let (status, body) = get_path(state(true), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("injector_admission_responses_total{allowed=\"true\"} 1"), "{body}");
        assert!(body.ends_with("# EOF\n"));
    }

    #[tokio::test]
    async fn healthz_is_static() {
        let (status, body) = get_path(state(false), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
