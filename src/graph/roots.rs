//! Cluster and namespace root resolution
//!
//! The finalize pass does not know how to materialize root entities itself;
//! it goes through a [`RootResolver`]. The default implementation creates
//! synthetic Cluster/Namespace nodes with hashed identities, reusing an
//! already-ingested node of the same kind and name when one exists.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::graph::{Graph, GraphError, NodeSpec, uid};

/// Resolves (lazily creating) the root entities a node hangs off.
pub trait RootResolver: Send + Sync {
    /// Resolve the cluster root for a cluster name, returning its UID.
    /// An empty name maps to the resolver's default cluster.
    fn cluster_root(&self, graph: &mut Graph, cluster: &str) -> Result<String, GraphError>;

    /// Resolve the namespace root for a (cluster, namespace) pair,
    /// returning its UID. The namespace root is connected to its cluster
    /// root as a side effect.
    fn namespace_root(
        &self,
        graph: &mut Graph,
        cluster: &str,
        namespace: &str,
    ) -> Result<String, GraphError>;
}

/// Default resolver: synthetic roots with deterministic hashed UIDs.
///
/// Resolved UIDs are cached per name so the finalize pass scans the node
/// table at most once per root, not once per node. A cached UID is only
/// reused while the node is still present, since one resolver may serve
/// several graph builds.
pub struct SyntheticRoots {
    default_cluster: String,
    cluster_uids: Mutex<HashMap<String, String>>,
    namespace_uids: Mutex<HashMap<(String, String), String>>,
}

impl SyntheticRoots {
    pub fn new(default_cluster: impl Into<String>) -> Self {
        SyntheticRoots {
            default_cluster: default_cluster.into(),
            cluster_uids: Mutex::new(HashMap::new()),
            namespace_uids: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for SyntheticRoots {
    fn default() -> Self {
        SyntheticRoots::new("kubernetes")
    }
}

impl RootResolver for SyntheticRoots {
    fn cluster_root(&self, graph: &mut Graph, cluster: &str) -> Result<String, GraphError> {
        let name = if cluster.is_empty() {
            self.default_cluster.as_str()
        } else {
            cluster
        };

        let mut cache = self
            .cluster_uids
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(uid) = cache.get(name) {
            if graph.get(uid).is_some() {
                return Ok(uid.clone());
            }
        }

        let existing = graph
            .nodes()
            .find(|n| n.kind == "Cluster" && n.name == name)
            .map(|n| n.uid.clone());
        let uid = match existing {
            Some(existing) => existing,
            None => graph.upsert(NodeSpec {
                api_version: "v1".to_string(),
                kind: "Cluster".to_string(),
                uid: Some(uid::to_uid(&["Cluster", name])),
                cluster: name.to_string(),
                name: name.to_string(),
                ..Default::default()
            })?,
        };
        cache.insert(name.to_string(), uid.clone());
        Ok(uid)
    }

    fn namespace_root(
        &self,
        graph: &mut Graph,
        cluster: &str,
        namespace: &str,
    ) -> Result<String, GraphError> {
        let cluster_uid = self.cluster_root(graph, cluster)?;
        let cluster_name = graph
            .get(&cluster_uid)
            .map(|n| n.name.clone())
            .unwrap_or_default();

        let mut cache = self
            .namespace_uids
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = (cluster_name.clone(), namespace.to_string());
        if let Some(uid) = cache.get(&key) {
            if graph.get(uid).is_some() {
                let uid = uid.clone();
                graph.relate(&cluster_uid, "Namespace", &uid);
                return Ok(uid);
            }
        }

        let existing = graph
            .nodes()
            .find(|n| n.kind == "Namespace" && n.name == namespace)
            .map(|n| n.uid.clone());
        let ns_uid = match existing {
            Some(uid) => uid,
            None => graph.upsert(NodeSpec {
                api_version: "v1".to_string(),
                kind: "Namespace".to_string(),
                uid: Some(uid::to_uid(&["Namespace", &cluster_name, namespace])),
                cluster: cluster_name,
                name: namespace.to_string(),
                ..Default::default()
            })?,
        };
        cache.insert(key, ns_uid.clone());

        graph.relate(&cluster_uid, "Namespace", &ns_uid);
        Ok(ns_uid)
    }
}
