use json_patch::Patch;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use thiserror::Error;

use crate::patch::{PodSpecView, SidecarPatch};

pub type Request = AdmissionRequest<DynamicObject>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("could not deserialize admission review: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("malformed admission review: request is missing")]
    MissingRequest,
    #[error("could not unmarshal pod on admission request: {0}")]
    PodUnmarshal(String),
    #[error("could not encode admission response: {0}")]
    Encode(String),
}

pub fn decode(body: &[u8]) -> Result<Request, CodecError> {
    let review: AdmissionReview<DynamicObject> =
        serde_json::from_slice(body).map_err(CodecError::Decode)?;
    review.try_into().map_err(|_| CodecError::MissingRequest)
}

/// Projects the request object onto the fields the patch builder reads.
pub fn pod_view(request: &Request) -> Result<PodSpecView, CodecError> {
    let object = request
        .object
        .as_ref()
        .ok_or_else(|| CodecError::PodUnmarshal("request carries no object".to_string()))?;
    let value =
        serde_json::to_value(object).map_err(|e| CodecError::PodUnmarshal(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| CodecError::PodUnmarshal(e.to_string()))
}

/// Best-effort `request.uid` lookup for bodies that failed to decode as a
/// full admission review.
pub fn request_uid(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .pointer("/request/uid")?
        .as_str()
        .filter(|uid| !uid.is_empty())
        .map(str::to_owned)
}

pub fn reject(reason: impl ToString, uid: Option<String>) -> AdmissionResponse {
    let mut response = AdmissionResponse::invalid(reason);
    if let Some(uid) = uid {
        response.uid = uid;
    }
    response
}

pub fn with_patch(
    response: AdmissionResponse,
    patches: Vec<SidecarPatch>,
) -> Result<AdmissionResponse, CodecError> {
    let operations = patches
        .into_iter()
        .map(SidecarPatch::into_operation)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    response
        .with_patch(Patch(operations))
        .map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn encode(response: AdmissionResponse) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&response.into_review()).map_err(|e| CodecError::Encode(e.to_string()))
}
