//! Full-cluster object discovery
//!
//! The ArgoCD resolver needs to see every object in the cluster, because
//! managed resources are not always linked to their application through
//! native owner references. [`discover_all`] enumerates every listable API
//! resource type and lists them concurrently with a bounded fan-out. A
//! failed or timed-out list contributes zero objects and is recorded in the
//! snapshot's failure report instead of failing the whole discovery —
//! availability over completeness, but no longer silent.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kube::Api;
use kube::api::ListParams;
use kube::core::DynamicObject;
use kube::discovery::{ApiResource, Discovery, Scope, verbs};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("API discovery failed: {0}")]
    Api(#[source] kube::Error),

    #[error("listing {resource} failed: {reason}")]
    List { resource: String, reason: String },

    #[error("listing {resource} timed out after {timeout:?}")]
    Timeout { resource: String, timeout: Duration },
}

/// One listable API resource type known to the cluster.
#[derive(Debug, Clone)]
pub struct ResourceType {
    pub resource: ApiResource,
    pub namespaced: bool,
}

impl ResourceType {
    pub fn new(group: &str, version: &str, kind: &str, plural: &str, namespaced: bool) -> Self {
        let api_version = if group.is_empty() {
            version.to_string()
        } else {
            format!("{group}/{version}")
        };
        ResourceType {
            resource: ApiResource {
                group: group.to_string(),
                version: version.to_string(),
                api_version,
                kind: kind.to_string(),
                plural: plural.to_string(),
            },
            namespaced,
        }
    }

    /// Qualified name for log and error messages, e.g. `deployments.apps`.
    pub fn qualified_name(&self) -> String {
        if self.resource.group.is_empty() {
            self.resource.plural.clone()
        } else {
            format!("{}.{}", self.resource.plural, self.resource.group)
        }
    }
}

/// A client capable of enumerating API resource types and listing all
/// objects of one type across the cluster.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn api_resources(&self) -> Result<Vec<ResourceType>, DiscoveryError>;

    async fn list(&self, resource: &ResourceType) -> Result<Vec<DynamicObject>, DiscoveryError>;
}

/// Tuning for the discovery fan-out.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum number of list requests in flight at once.
    pub concurrency: usize,
    /// Per-list timeout; a timed-out type is reported as a failure.
    pub timeout: Option<Duration>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            concurrency: 8,
            timeout: None,
        }
    }
}

/// A list that failed during discovery, kept alongside the merged results.
#[derive(Debug)]
pub struct ListFailure {
    pub resource: String,
    pub error: DiscoveryError,
}

/// Merged discovery results plus the structured partial-failure report.
#[derive(Debug, Default)]
pub struct DiscoverySnapshot {
    pub objects: Vec<DynamicObject>,
    pub failures: Vec<ListFailure>,
}

/// List every object of every known resource type.
///
/// Only a failure to enumerate the resource types themselves is fatal;
/// individual list failures land in [`DiscoverySnapshot::failures`].
pub async fn discover_all<L>(
    lister: &L,
    options: &DiscoveryOptions,
) -> Result<DiscoverySnapshot, DiscoveryError>
where
    L: ObjectLister + ?Sized,
{
    let resources = lister.api_resources().await?;
    let timeout = options.timeout;

    let mut lists = futures::stream::iter(resources.into_iter().map(|rt| async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, lister.list(&rt)).await {
                Ok(result) => result,
                Err(_) => Err(DiscoveryError::Timeout {
                    resource: rt.qualified_name(),
                    timeout: limit,
                }),
            },
            None => lister.list(&rt).await,
        };
        (rt, result)
    }))
    .buffer_unordered(options.concurrency.max(1));

    let mut snapshot = DiscoverySnapshot::default();
    while let Some((rt, result)) = lists.next().await {
        match result {
            Ok(objs) => {
                tracing::debug!("listed {} {}", objs.len(), rt.qualified_name());
                snapshot.objects.extend(objs);
            }
            Err(error) => {
                tracing::warn!("skipping {}: {error}", rt.qualified_name());
                snapshot.failures.push(ListFailure {
                    resource: rt.qualified_name(),
                    error,
                });
            }
        }
    }

    Ok(snapshot)
}

/// Kubernetes-backed [`ObjectLister`] using kube's runtime API discovery.
pub struct KubeLister {
    client: kube::Client,
}

impl KubeLister {
    pub fn new(client: kube::Client) -> Self {
        KubeLister { client }
    }

    /// List one resource type scoped to a single namespace.
    pub async fn list_namespaced(
        &self,
        resource: &ResourceType,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, DiscoveryError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource.resource);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| DiscoveryError::List {
                resource: resource.qualified_name(),
                reason: err.to_string(),
            })?;
        Ok(list.items)
    }
}

#[async_trait]
impl ObjectLister for KubeLister {
    async fn api_resources(&self) -> Result<Vec<ResourceType>, DiscoveryError> {
        let discovery = Discovery::new(self.client.clone())
            .run()
            .await
            .map_err(DiscoveryError::Api)?;

        let mut resources = Vec::new();
        for group in discovery.groups() {
            for (resource, caps) in group.recommended_resources() {
                if !caps.supports_operation(verbs::LIST) {
                    continue;
                }
                resources.push(ResourceType {
                    resource,
                    namespaced: caps.scope == Scope::Namespaced,
                });
            }
        }
        Ok(resources)
    }

    async fn list(&self, resource: &ResourceType) -> Result<Vec<DynamicObject>, DiscoveryError> {
        // all_with lists across every namespace for namespaced types.
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource.resource);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|err| DiscoveryError::List {
                resource: resource.qualified_name(),
                reason: err.to_string(),
            })?;
        Ok(list.items)
    }
}
