use serde_json::{Value, json};

pub const TEST_UID: &str = "0c9a8d74-9cb7-44dd-b98e-09fd62def2f4";

/// A Pod document with the given `spec.containers`, `spec.volumes` and
/// optional `metadata.labels`.
pub fn pod(containers: Value, volumes: Value, labels: Option<Value>) -> Value {
    let mut metadata = json!({
        "name": "echo-pod",
        "namespace": "default",
    });
    if let Some(labels) = labels {
        metadata["labels"] = labels;
    }

    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": metadata,
        "spec": {
            "containers": containers,
            "volumes": volumes,
        }
    })
}

/// Serialized `admission.k8s.io/v1` review for a Pod CREATE.
pub fn review_body(object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": TEST_UID,
            "kind": {"group": "", "version": "v1", "kind": "Pod"},
            "resource": {"group": "", "version": "v1", "resource": "pods"},
            "requestKind": {"group": "", "version": "v1", "kind": "Pod"},
            "requestResource": {"group": "", "version": "v1", "resource": "pods"},
            "name": "echo-pod",
            "namespace": "default",
            "operation": "CREATE",
            "userInfo": {
                "username": "system:serviceaccount:kube-system:replicaset-controller",
                "groups": ["system:authenticated"]
            },
            "object": object,
            "oldObject": null,
            "dryRun": false,
            "options": {"kind": "CreateOptions", "apiVersion": "meta.k8s.io/v1"}
        }
    }))
    .expect("review fixture serializes")
}
