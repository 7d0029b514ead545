//! Resource graph construction
//!
//! This module owns the node table and relationship adjacency for one graph
//! build. Objects are upserted by UID; declared owner references are expanded
//! into stub nodes and owner → child edges as a side effect of every upsert.
//! After ingestion the finalize pass connects every still-disconnected node
//! to its cluster or namespace root so the whole graph is reachable from a
//! single synthetic cluster entity.

mod builder;
mod error;
mod roots;
pub mod uid;

pub use builder::{GraphBuilder, GroupHandler, IngestReport};
pub use error::GraphError;
pub use roots::{RootResolver, SyntheticRoots};

use std::collections::{BTreeMap, HashMap, HashSet};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::core::DynamicObject;
use serde::Serialize;

/// A node in the resource graph, one per resource instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub api_version: String,
    pub kind: String,
    pub uid: String,
    /// Stamped by the finalize pass; empty until then for ingested objects.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A labeled directed edge between two node UIDs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relationship {
    pub from: String,
    pub label: String,
    pub to: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl Relationship {
    /// Attach a key/value attribute to this relationship.
    pub fn attribute(&mut self, key: &str, value: &str) -> &mut Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }
}

/// Everything needed to upsert one node: type, identity, descriptor fields,
/// and the declared owner references to expand.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    pub api_version: String,
    pub kind: String,
    /// Native UID when the object carries one; a synthetic UID is derived
    /// from (api_version, kind, namespace, name) otherwise.
    pub uid: Option<String>,
    pub cluster: String,
    pub namespace: Option<String>,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
}

impl From<&DynamicObject> for NodeSpec {
    fn from(obj: &DynamicObject) -> Self {
        let (api_version, kind) = obj
            .types
            .as_ref()
            .map(|t| (t.api_version.clone(), t.kind.clone()))
            .unwrap_or_default();

        NodeSpec {
            api_version,
            kind,
            uid: obj.metadata.uid.clone().filter(|u| !u.is_empty()),
            cluster: String::new(),
            namespace: obj.metadata.namespace.clone().filter(|ns| !ns.is_empty()),
            name: obj.metadata.name.clone().unwrap_or_default(),
            labels: obj.metadata.labels.clone().unwrap_or_default(),
            annotations: obj.metadata.annotations.clone().unwrap_or_default(),
            owner_references: obj.metadata.owner_references.clone().unwrap_or_default(),
        }
    }
}

/// Graph construction options.
#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    /// Allow multiple distinctly-labeled relationships per ordered
    /// (from, to) pair. Off by default: the first relationship created for a
    /// pair wins and later labels are ignored.
    pub multi_edge: bool,
}

/// The graph store: node table plus relationship adjacency keyed by target
/// UID (the dominant query is "who points at this node").
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Node>,
    relationships: HashMap<String, Vec<Relationship>>,
    multi_edge: bool,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: GraphOptions) -> Self {
        Graph {
            multi_edge: options.multi_edge,
            ..Default::default()
        }
    }

    /// Upsert a node and expand its declared owner references.
    ///
    /// Merge rule on a repeat UID: type and descriptor fields are taken from
    /// the incoming spec, but the first non-empty label/annotation set stored
    /// for a node is kept for the rest of the run. Each declared owner is
    /// upserted as a stub (same namespace as the child) and related to the
    /// child with the child's kind as the label.
    pub fn upsert(&mut self, spec: NodeSpec) -> Result<String, GraphError> {
        let mut visited = HashSet::new();
        self.upsert_inner(spec, &mut visited)
    }

    /// Convenience wrapper for raw objects from the API.
    pub fn upsert_object(&mut self, obj: &DynamicObject) -> Result<String, GraphError> {
        self.upsert(NodeSpec::from(obj))
    }

    fn upsert_inner(
        &mut self,
        spec: NodeSpec,
        visited: &mut HashSet<String>,
    ) -> Result<String, GraphError> {
        let uid = match &spec.uid {
            Some(uid) => uid.clone(),
            None => uid::to_uid(&[
                &spec.api_version,
                &spec.kind,
                spec.namespace.as_deref().unwrap_or(""),
                &spec.name,
            ]),
        };

        if !visited.insert(uid.clone()) {
            return Err(GraphError::OwnershipCycle {
                uid,
                kind: spec.kind,
                name: spec.name,
            });
        }

        let kind = spec.kind.clone();
        let namespace = spec.namespace.clone();

        let mut node = Node {
            api_version: spec.api_version,
            kind: spec.kind,
            uid: uid.clone(),
            cluster: spec.cluster,
            namespace: spec.namespace,
            name: spec.name,
            labels: spec.labels,
            annotations: spec.annotations,
        };

        // First-non-empty-wins: a stored non-empty set is kept even when the
        // incoming object carries its own.
        if let Some(prev) = self.nodes.remove(&uid) {
            if !prev.labels.is_empty() {
                node.labels = prev.labels;
            }
            if !prev.annotations.is_empty() {
                node.annotations = prev.annotations;
            }
        }
        self.nodes.insert(uid.clone(), node);

        // Owners are assumed same-namespace unless cluster-scoped; the stub
        // carries the child's namespace.
        for owner in spec.owner_references {
            let owner_uid = self.upsert_inner(
                NodeSpec {
                    api_version: owner.api_version,
                    kind: owner.kind,
                    uid: Some(owner.uid),
                    namespace: namespace.clone(),
                    name: owner.name,
                    ..Default::default()
                },
                visited,
            )?;
            self.relate(&owner_uid, &kind, &uid);
        }

        Ok(uid)
    }

    /// Create (or return the existing) relationship between two nodes.
    ///
    /// At most one relationship exists per ordered (from, to) pair; a second
    /// request with a different label returns the original edge unchanged.
    /// With [`GraphOptions::multi_edge`] the dedup key includes the label.
    pub fn relate(&mut self, from: &str, label: &str, to: &str) -> &mut Relationship {
        let multi_edge = self.multi_edge;
        let edges = self.relationships.entry(to.to_string()).or_default();

        let idx = match edges
            .iter()
            .position(|r| r.from == from && (!multi_edge || r.label == label))
        {
            Some(idx) => idx,
            None => {
                edges.push(Relationship {
                    from: from.to_string(),
                    label: label.to_string(),
                    to: to.to_string(),
                    attrs: BTreeMap::new(),
                });
                edges.len() - 1
            }
        };

        &mut edges[idx]
    }

    /// Look up a node by UID.
    pub fn get(&self, uid: &str) -> Option<&Node> {
        self.nodes.get(uid)
    }

    /// Relationships pointing at the given node.
    pub fn incoming(&self, uid: &str) -> &[Relationship] {
        self.relationships.get(uid).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mutable access to the relationship for an ordered (from, to) pair.
    pub fn relationship_mut(&mut self, from: &str, to: &str) -> Option<&mut Relationship> {
        self.relationships
            .get_mut(to)?
            .iter_mut()
            .find(|r| r.from == from)
    }

    /// Set an attribute on the relationship for an ordered (from, to) pair.
    /// Returns false when no such relationship exists.
    pub fn set_attribute(&mut self, from: &str, to: &str, key: &str, value: &str) -> bool {
        match self.relationship_mut(from, to) {
            Some(rel) => {
                rel.attribute(key, value);
                true
            }
            None => false,
        }
    }

    /// Unordered snapshot of all nodes. Iteration order is not stable;
    /// callers wanting deterministic output must sort.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Unordered snapshot of all relationships.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values().flatten()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.values().map(Vec::len).sum()
    }

    /// Connect every node left disconnected by ingestion to its cluster or
    /// namespace root. Runs once after all objects have been ingested.
    ///
    /// Cluster and namespace roots themselves are exempt. A node that
    /// already has any incoming relationship is only re-stamped with its
    /// resolved cluster name and otherwise left alone. Any resolution
    /// failure aborts the pass; edges added by earlier iterations remain.
    pub fn finalize(&mut self, roots: &dyn RootResolver) -> Result<(), GraphError> {
        let uids: Vec<String> = self.nodes.keys().cloned().collect();

        for uid in uids {
            let (kind, cluster, namespace) = match self.nodes.get(&uid) {
                Some(node) => (
                    node.kind.clone(),
                    node.cluster.clone(),
                    node.namespace.clone(),
                ),
                None => continue,
            };

            if kind == "Cluster" || kind == "Namespace" {
                continue;
            }

            let root_uid = roots.cluster_root(self, &cluster)?;
            let root_name = self
                .nodes
                .get(&root_uid)
                .map(|n| n.name.clone())
                .unwrap_or_default();
            if let Some(node) = self.nodes.get_mut(&uid) {
                node.cluster = root_name.clone();
            }

            // Already connected to something, whatever the label.
            if !self.incoming(&uid).is_empty() {
                continue;
            }

            match namespace {
                None => {
                    self.relate(&root_uid, &kind, &uid);
                }
                Some(ns) => {
                    let ns_uid = roots.namespace_root(self, &root_name, &ns)?;
                    self.relate(&ns_uid, &kind, &uid);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: &str, uid: &str, name: &str, namespace: Option<&str>) -> NodeSpec {
        NodeSpec {
            api_version: "v1".to_string(),
            kind: kind.to_string(),
            uid: Some(uid.to_string()),
            namespace: namespace.map(String::from),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_merge_preserves_first_non_empty() {
        let mut graph = Graph::new();

        let mut first = spec("Pod", "uid-1", "web", Some("default"));
        first.labels.insert("env".to_string(), "prod".to_string());
        graph.upsert(first).unwrap();

        let mut second = spec("Pod", "uid-1", "web", Some("default"));
        second
            .annotations
            .insert("team".to_string(), "x".to_string());
        graph.upsert(second).unwrap();

        let node = graph.get("uid-1").unwrap();
        assert_eq!(node.labels.get("env").map(String::as_str), Some("prod"));
        assert_eq!(node.annotations.get("team").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_label_merge_keeps_first_set_over_later_values() {
        let mut graph = Graph::new();

        let mut first = spec("Pod", "uid-1", "web", Some("default"));
        first.labels.insert("env".to_string(), "prod".to_string());
        graph.upsert(first).unwrap();

        // A later non-empty set does not replace the stored one.
        let mut second = spec("Pod", "uid-1", "web", Some("default"));
        second.labels.insert("env".to_string(), "dev".to_string());
        graph.upsert(second).unwrap();

        let node = graph.get("uid-1").unwrap();
        assert_eq!(node.labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn test_relate_first_label_wins() {
        let mut graph = Graph::new();
        graph.upsert(spec("Pod", "x", "x", None)).unwrap();
        graph.upsert(spec("Pod", "y", "y", None)).unwrap();

        graph.relate("x", "Foo", "y");
        let second = graph.relate("x", "Bar", "y").clone();

        assert_eq!(second.label, "Foo");
        assert_eq!(graph.relationship_count(), 1);
    }

    #[test]
    fn test_relate_multi_edge_option() {
        let mut graph = Graph::with_options(GraphOptions { multi_edge: true });
        graph.relate("x", "Foo", "y");
        graph.relate("x", "Bar", "y");
        graph.relate("x", "Foo", "y");
        assert_eq!(graph.relationship_count(), 2);
    }

    #[test]
    fn test_owner_expansion_creates_stub_and_edge() {
        let mut graph = Graph::new();

        let mut child = spec("Pod", "pod-uid", "web-abc", Some("default"));
        child.owner_references.push(OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: "web".to_string(),
            uid: "rs-uid".to_string(),
            ..Default::default()
        });
        graph.upsert(child).unwrap();

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.relationship_count(), 1);

        let owner = graph.get("rs-uid").unwrap();
        assert_eq!(owner.kind, "ReplicaSet");
        assert_eq!(owner.namespace.as_deref(), Some("default"));

        let edges = graph.incoming("pod-uid");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, "rs-uid");
        assert_eq!(edges[0].label, "Pod");
    }

    #[test]
    fn test_owner_expansion_detects_self_cycle() {
        let mut graph = Graph::new();

        let mut looped = spec("Pod", "pod-uid", "web", Some("default"));
        looped.owner_references.push(OwnerReference {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            name: "web".to_string(),
            uid: "pod-uid".to_string(),
            ..Default::default()
        });

        let err = graph.upsert(looped).unwrap_err();
        assert!(matches!(err, GraphError::OwnershipCycle { .. }));
    }

    #[test]
    fn test_missing_uid_gets_synthetic_identity() {
        let mut graph = Graph::new();

        let mut manifest = spec("ConfigMap", "ignored", "settings", Some("default"));
        manifest.uid = None;
        let first = graph.upsert(manifest.clone()).unwrap();
        let second = graph.upsert(manifest).unwrap();

        assert_eq!(first, second);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_finalize_connects_disconnected_nodes() {
        let mut graph = Graph::new();
        graph
            .upsert(spec("Deployment", "dep-uid", "web", Some("default")))
            .unwrap();
        graph
            .upsert(spec("ClusterRole", "role-uid", "admin", None))
            .unwrap();

        let roots = SyntheticRoots::new("test-cluster");
        graph.finalize(&roots).unwrap();

        for node in graph.nodes() {
            if node.kind == "Cluster" {
                continue;
            }
            assert!(
                !graph.incoming(&node.uid).is_empty(),
                "{}/{} left disconnected",
                node.kind,
                node.name
            );
            assert_eq!(node.cluster, "test-cluster");
        }

        // Namespaced node hangs off the namespace root, cluster-scoped node
        // hangs off the cluster root.
        let dep_edge = &graph.incoming("dep-uid")[0];
        assert_eq!(graph.get(&dep_edge.from).unwrap().kind, "Namespace");
        let role_edge = &graph.incoming("role-uid")[0];
        assert_eq!(graph.get(&role_edge.from).unwrap().kind, "Cluster");
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut graph = Graph::new();
        graph
            .upsert(spec("Deployment", "dep-uid", "web", Some("default")))
            .unwrap();

        let roots = SyntheticRoots::new("test-cluster");
        graph.finalize(&roots).unwrap();
        let after_first = graph.relationship_count();
        graph.finalize(&roots).unwrap();
        assert_eq!(graph.relationship_count(), after_first);
    }

    #[test]
    fn test_finalize_skips_already_connected_nodes() {
        let mut graph = Graph::new();

        let mut pod = spec("Pod", "pod-uid", "web-abc", Some("default"));
        pod.owner_references.push(OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: "web".to_string(),
            uid: "rs-uid".to_string(),
            ..Default::default()
        });
        graph.upsert(pod).unwrap();

        let roots = SyntheticRoots::new("test-cluster");
        graph.finalize(&roots).unwrap();

        // The pod keeps its single owner edge; no namespace edge is added.
        let edges = graph.incoming("pod-uid");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].from, "rs-uid");
    }

    #[test]
    fn test_relationship_attributes() {
        let mut graph = Graph::new();
        graph.relate("a", "Pod", "b").attribute("port", "8080");
        let rel = graph.relationship_mut("a", "b").unwrap();
        assert_eq!(rel.attrs.get("port").map(String::as_str), Some("8080"));

        assert!(graph.set_attribute("a", "b", "proto", "TCP"));
        assert!(!graph.set_attribute("a", "missing", "proto", "TCP"));
    }
}
