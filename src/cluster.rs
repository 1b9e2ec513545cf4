use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to build kubernetes client: {0}")]
    Client(#[source] kube::Error),
    #[error("failed to list pods: {0}")]
    ListPods(#[source] kube::Error),
}

/// Confirms the in-cluster credentials work by listing Pods across all
/// namespaces. Returns the number of Pods seen.
pub async fn check_connectivity() -> Result<usize, ClusterError> {
    let client = Client::try_default().await.map_err(ClusterError::Client)?;
    let pods: Api<Pod> = Api::all(client);
    let list = pods
        .list(&ListParams::default())
        .await
        .map_err(ClusterError::ListPods)?;

    info!(pods = list.items.len(), "connected to cluster");
    Ok(list.items.len())
}
