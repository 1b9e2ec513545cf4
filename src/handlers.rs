use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use kube::core::admission::AdmissionResponse;
use tracing::{debug, error, info, warn};

use crate::codec::{self, CodecError};
use crate::metrics::{InjectorMetrics, PatchLabels, RequestLabels};
use crate::patch;
use crate::sidecar::SidecarTemplate;

pub struct AppState {
    pub template: SidecarTemplate,
    pub metrics: InjectorMetrics,
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
}

pub type SharedState = Arc<AppState>;

pub fn webhook_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/mutate", post(handle_mutate))
        .with_state(state)
}

async fn handle_root() -> &'static str {
    "HandleRoot!"
}

async fn handle_mutate(State(state): State<SharedState>, request: Request) -> Response {
    let start = Instant::now();

    let result = match read_body(&state, request.into_body()).await {
        Ok(body) => admit(&state, &body),
        Err(reason) => {
            warn!("rejecting admission review: {reason}");
            Ok(codec::reject(reason, None))
        }
    };

    let response = respond(&state, result);
    state
        .metrics
        .admission_request_duration_seconds
        .observe(start.elapsed().as_secs_f64());
    response
}

async fn read_body(state: &AppState, body: Body) -> Result<Bytes, String> {
    match tokio::time::timeout(
        state.request_timeout,
        axum::body::to_bytes(body, state.max_body_bytes),
    )
    .await
    {
        Ok(Ok(bytes)) => Ok(bytes),
        Ok(Err(e)) => Err(format!(
            "failed to read request body (limit {} bytes): {e}",
            state.max_body_bytes
        )),
        Err(_) => Err(format!(
            "timed out reading request body after {:?}",
            state.request_timeout
        )),
    }
}

/// Runs one review through the injection pipeline.
///
/// Unreadable input becomes an `allowed: false` response; only encoding
/// failures surface as `Err`.
fn admit(state: &AppState, body: &[u8]) -> Result<AdmissionResponse, CodecError> {
    let request = match codec::decode(body) {
        Ok(request) => request,
        Err(e) => {
            let uid = codec::request_uid(body);
            warn!(uid = uid.as_deref().unwrap_or("<unknown>"), "rejecting admission review: {e}");
            return Ok(codec::reject(e, uid));
        }
    };

    state
        .metrics
        .admission_requests_total
        .get_or_create(&RequestLabels {
            operation: format!("{:?}", request.operation).to_uppercase(),
            kind: request.kind.kind.clone(),
        })
        .inc();

    info!(
        uid = %request.uid,
        kind = %request.kind.kind,
        operation = ?request.operation,
        name = %request.name,
        "received admission request"
    );

    let pod = match codec::pod_view(&request) {
        Ok(pod) => pod,
        Err(e) => {
            warn!(uid = %request.uid, "rejecting admission review: {e}");
            return Ok(AdmissionResponse::from(&request).deny(e));
        }
    };

    let patches = patch::build(&pod, &state.template);
    for op in &patches {
        state
            .metrics
            .patch_operations_total
            .get_or_create(&PatchLabels { target: op.target() })
            .inc();
    }
    debug!(uid = %request.uid, patch_ops = patches.len(), "injecting nginx sidecar");

    codec::with_patch(AdmissionResponse::from(&request), patches)
}

fn respond(state: &AppState, result: Result<AdmissionResponse, CodecError>) -> Response {
    let encoded = result.and_then(|response| {
        let allowed = response.allowed;
        codec::encode(response).map(|bytes| (allowed, bytes))
    });

    match encoded {
        Ok((allowed, bytes)) => {
            state.metrics.record_response(allowed);
            ([(header::CONTENT_TYPE, "application/json")], bytes).into_response()
        }
        Err(e) => {
            error!("failed to encode admission response: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
