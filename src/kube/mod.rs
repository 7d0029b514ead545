//! Cluster connection
//!
//! Configuration is inferred the standard way: in-cluster service account
//! first, then the local kubeconfig (honoring `KUBECONFIG` and the current
//! context). The cluster name used for graph roots is taken from the API
//! server host.

use anyhow::{Context, Result};
use kube::{Client, Config};

/// A connected cluster: the API client plus the name graph roots carry.
pub struct ClusterClient {
    pub client: Client,
    pub cluster_name: String,
}

pub async fn connect() -> Result<ClusterClient> {
    let config = Config::infer()
        .await
        .context("failed to load kubeconfig or in-cluster configuration")?;

    let cluster_name = config
        .cluster_url
        .host()
        .unwrap_or("kubernetes")
        .to_string();

    let client = Client::try_from(config).context("failed to build Kubernetes client")?;

    Ok(ClusterClient {
        client,
        cluster_name,
    })
}
