//! Graph construction error types

use thiserror::Error;

use crate::discovery::DiscoveryError;

/// Errors raised while building the graph.
///
/// Malformed-input and handler errors are collected per object by the
/// builder and do not abort the batch; see [`crate::graph::IngestReport`].
#[derive(Debug, Error)]
pub enum GraphError {
    /// An ownership traversal revisited a node on the current path.
    /// Real owner chains are acyclic; this guards against malformed input.
    #[error("ownership cycle detected at {kind}/{name} ({uid})")]
    OwnershipCycle {
        uid: String,
        kind: String,
        name: String,
    },

    /// An object is missing a field required for relationship extraction.
    #[error("{kind}/{name}: missing or invalid field {field}")]
    MalformedObject {
        kind: String,
        name: String,
        field: String,
    },

    /// A cluster or namespace root could not be resolved during finalize.
    #[error("failed to resolve root for cluster {cluster:?}: {reason}")]
    RootResolution { cluster: String, reason: String },

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}
