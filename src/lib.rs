//! kubegraph builds a directed graph of Kubernetes resources and their
//! relationships and renders it for Neo4j (Cypher) or Graphviz.
//!
//! Objects are ingested into a [`graph::Graph`], which expands declared
//! owner references into edges. Group handlers such as
//! [`argocd::ArgoHandler`] add relationships native metadata does not
//! express. A finalize pass connects every remaining orphan to a synthetic
//! cluster or namespace root so the rendered graph is fully connected.

pub mod argocd;
pub mod cli;
pub mod discovery;
pub mod graph;
pub mod kube;
pub mod render;

pub use graph::{
    Graph, GraphBuilder, GraphError, GraphOptions, IngestReport, Node, NodeSpec, Relationship,
};
pub use render::OutputRegistry;
