//! Batch ingestion and group dispatch
//!
//! [`GraphBuilder`] drives one graph build: every object gets the generic
//! node + owner-edge treatment, then is routed by apiVersion to an optional
//! group-specific handler for further relationship extraction. Per-object
//! errors are collected, not fatal; the batch always runs to completion and
//! the partial graph stays usable.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use kube::core::DynamicObject;

use crate::graph::{Graph, GraphError, GraphOptions, RootResolver, SyntheticRoots};

/// A group-specific graph extension, one per supported apiVersion.
#[async_trait]
pub trait GroupHandler: Send + Sync {
    async fn handle(&self, graph: &mut Graph, obj: &DynamicObject) -> Result<(), GraphError>;
}

/// Aggregated per-object ingestion errors. The graph that comes with a
/// non-empty report is still usable; partial success is the norm.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub errors: Vec<GraphError>,
}

impl IngestReport {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} object(s) failed during ingestion: ",
            self.errors.len()
        )?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

/// Builds a [`Graph`] from a sequence of raw objects.
pub struct GraphBuilder {
    handlers: HashMap<String, Box<dyn GroupHandler>>,
    roots: Box<dyn RootResolver>,
    options: GraphOptions,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            handlers: HashMap::new(),
            roots: Box::new(SyntheticRoots::default()),
            options: GraphOptions::default(),
        }
    }

    /// Replace the root resolver used by the finalize pass.
    pub fn roots(mut self, roots: Box<dyn RootResolver>) -> Self {
        self.roots = roots;
        self
    }

    /// Register a group handler for an apiVersion (e.g. `argoproj.io/v1alpha1`).
    pub fn handler(
        mut self,
        api_version: impl Into<String>,
        handler: Box<dyn GroupHandler>,
    ) -> Self {
        self.handlers.insert(api_version.into(), handler);
        self
    }

    pub fn options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    /// Ingest every object, run the finalize pass once, and return the graph
    /// together with the aggregated (non-fatal) error report. The progress
    /// callback fires after each object, successful or not.
    pub async fn build(
        &self,
        objs: &[DynamicObject],
        mut progress: impl FnMut(),
    ) -> (Graph, IngestReport) {
        let mut graph = Graph::with_options(self.options.clone());
        let mut report = IngestReport::default();

        for obj in objs {
            if let Err(err) = self.ingest(&mut graph, obj).await {
                tracing::debug!("ingestion error: {err}");
                report.errors.push(err);
            }
            progress();
        }

        // A finalize failure joins the report; the partial graph survives.
        if let Err(err) = graph.finalize(self.roots.as_ref()) {
            report.errors.push(err);
        }

        (graph, report)
    }

    async fn ingest(&self, graph: &mut Graph, obj: &DynamicObject) -> Result<(), GraphError> {
        graph.upsert_object(obj)?;

        // Unrecognized groups get the generic treatment only; not an error.
        let api_version = obj
            .types
            .as_ref()
            .map(|t| t.api_version.as_str())
            .unwrap_or("");
        if let Some(handler) = self.handlers.get(api_version) {
            handler.handle(graph, obj).await?;
        }

        Ok(())
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        GraphBuilder::new()
    }
}
