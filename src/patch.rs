use std::collections::BTreeMap;

use json_patch::jsonptr::PointerBuf;
use json_patch::{AddOperation, PatchOperation};
use k8s_openapi::api::core::v1::{Container, Volume};
use serde::{Deserialize, Serialize};

use crate::sidecar::SidecarTemplate;

pub const SIDECAR_LABEL_KEY: &str = "nginx-sidecar";
pub const SIDECAR_LABEL_VALUE: &str = "applied-from-mutating-webhook";

const CONTAINERS_PATH: [&str; 2] = ["spec", "containers"];
const VOLUMES_PATH: [&str; 2] = ["spec", "volumes"];
const LABELS_PATH: [&str; 2] = ["metadata", "labels"];
const APPEND_TOKEN: &str = "-";

/// The parts of a Pod the builder needs: existing containers, volumes and labels.
///
/// Absent or null `spec.containers` / `spec.volumes` deserialize as empty
/// lists and absent or null `metadata.labels` as `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "PodDocument")]
pub struct PodSpecView {
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Deserialize)]
struct PodDocument {
    #[serde(default)]
    metadata: Option<PodMetadata>,
    #[serde(default)]
    spec: Option<PodSpecFields>,
}

#[derive(Default, Deserialize)]
struct PodMetadata {
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Default, Deserialize)]
struct PodSpecFields {
    #[serde(default)]
    containers: Option<Vec<Container>>,
    #[serde(default)]
    volumes: Option<Vec<Volume>>,
}

impl From<PodDocument> for PodSpecView {
    fn from(doc: PodDocument) -> Self {
        let spec = doc.spec.unwrap_or_default();
        Self {
            containers: spec.containers.unwrap_or_default(),
            volumes: spec.volumes.unwrap_or_default(),
            labels: doc.metadata.unwrap_or_default().labels,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    Add,
}

/// Value carried by an injected patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    Containers(Vec<Container>),
    Container(Box<Container>),
    Volumes(Vec<Volume>),
    Volume(Box<Volume>),
    Labels(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SidecarPatch {
    pub op: PatchOp,
    pub path: PointerBuf,
    pub value: PatchValue,
}

impl SidecarPatch {
    fn add(path: PointerBuf, value: PatchValue) -> Self {
        Self {
            op: PatchOp::Add,
            path,
            value,
        }
    }

    /// Pod field this operation writes to, used as a metric label.
    pub fn target(&self) -> &'static str {
        match self.value {
            PatchValue::Containers(_) | PatchValue::Container(_) => "containers",
            PatchValue::Volumes(_) | PatchValue::Volume(_) => "volumes",
            PatchValue::Labels(_) => "labels",
        }
    }

    pub fn into_operation(self) -> Result<PatchOperation, serde_json::Error> {
        let value = serde_json::to_value(&self.value)?;
        Ok(match self.op {
            PatchOp::Add => PatchOperation::Add(AddOperation {
                path: self.path,
                value,
            }),
        })
    }
}

trait Injectable: Clone {
    fn seed(items: Vec<Self>) -> PatchValue;
    fn single(self) -> PatchValue;
}

impl Injectable for Container {
    fn seed(items: Vec<Self>) -> PatchValue {
        PatchValue::Containers(items)
    }

    fn single(self) -> PatchValue {
        PatchValue::Container(Box::new(self))
    }
}

impl Injectable for Volume {
    fn seed(items: Vec<Self>) -> PatchValue {
        PatchValue::Volumes(items)
    }

    fn single(self) -> PatchValue {
        PatchValue::Volume(Box::new(self))
    }
}

/// Appends `additions` to the array at `base`.
///
/// An empty target array does not exist yet as far as JSON Patch is
/// concerned, so the first addition creates it as a one-element array and the
/// rest go through `base/-`.
fn append_items<T: Injectable>(
    existing: &[T],
    additions: &[T],
    base: [&str; 2],
) -> Vec<SidecarPatch> {
    let mut first = existing.is_empty();
    let mut patches = Vec::with_capacity(additions.len());

    for item in additions {
        if first {
            first = false;
            patches.push(SidecarPatch::add(
                PointerBuf::from_tokens(base),
                T::seed(vec![item.clone()]),
            ));
        } else {
            patches.push(SidecarPatch::add(
                PointerBuf::from_tokens(base.into_iter().chain([APPEND_TOKEN])),
                item.clone().single(),
            ));
        }
    }

    patches
}

fn label_patch(existing: Option<&BTreeMap<String, String>>) -> SidecarPatch {
    let mut labels = existing.cloned().unwrap_or_default();
    labels.insert(SIDECAR_LABEL_KEY.to_string(), SIDECAR_LABEL_VALUE.to_string());
    SidecarPatch::add(PointerBuf::from_tokens(LABELS_PATH), PatchValue::Labels(labels))
}

/// Computes the ordered operations injecting `template` into `pod`:
/// container additions, then volume additions, then the full label map.
///
/// A Pod that already runs the sidecar gets a second copy.
pub fn build(pod: &PodSpecView, template: &SidecarTemplate) -> Vec<SidecarPatch> {
    let mut patches = append_items(&pod.containers, &template.containers, CONTAINERS_PATH);
    patches.extend(append_items(&pod.volumes, &template.volumes, VOLUMES_PATH));
    patches.push(label_patch(pod.labels.as_ref()));
    patches
}
