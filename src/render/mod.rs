//! Graph output rendering
//!
//! Renderers turn a finished graph into text for an external tool. Every
//! renderer writes into an in-memory buffer first; a render error never
//! leaves a half-written output behind.

mod cypher;
mod graphviz;

use std::collections::HashMap;
use std::io::Write;
use std::sync::LazyLock;

pub use cypher::CypherRenderer;
pub use graphviz::GraphvizRenderer;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::graph::{Graph, Node, Relationship};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown output format \"{0}\"")]
    UnknownFormat(String),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML encoding failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One output format. Renderers append to the buffer and never write
/// directly to the destination.
pub trait Renderer: Send + Sync {
    fn render(&self, graph: &Graph, out: &mut String) -> Result<(), RenderError>;
}

/// Format-name lookup for the registered renderers.
pub struct OutputRegistry {
    renderers: HashMap<String, Box<dyn Renderer>>,
}

impl OutputRegistry {
    /// Registry with the built-in formats.
    pub fn new() -> Self {
        let mut registry = OutputRegistry {
            renderers: HashMap::new(),
        };
        registry.register("cypher", Box::new(CypherRenderer));
        registry.register("graphviz", Box::new(GraphvizRenderer));
        registry
    }

    pub fn register(&mut self, format: impl Into<String>, renderer: Box<dyn Renderer>) {
        self.renderers.insert(format.into(), renderer);
    }

    /// Registered format names, sorted for stable help and error output.
    pub fn formats(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.renderers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn render_to_string(&self, format: &str, graph: &Graph) -> Result<String, RenderError> {
        let renderer = self
            .renderers
            .get(format)
            .ok_or_else(|| RenderError::UnknownFormat(format.to_string()))?;
        let mut out = String::new();
        renderer.render(graph, &mut out)?;
        Ok(out)
    }

    /// Render and write in one step. The destination sees either the whole
    /// output or nothing.
    pub fn write(
        &self,
        format: &str,
        graph: &Graph,
        dest: &mut impl Write,
    ) -> Result<(), RenderError> {
        let out = self.render_to_string(format, graph)?;
        dest.write_all(out.as_bytes())?;
        Ok(())
    }
}

impl Default for OutputRegistry {
    fn default() -> Self {
        OutputRegistry::new()
    }
}

/// Nodes in deterministic order (by UID) so output is diffable.
pub(crate) fn sorted_nodes(graph: &Graph) -> Vec<&Node> {
    let mut nodes: Vec<&Node> = graph.nodes().collect();
    nodes.sort_unstable_by(|a, b| a.uid.cmp(&b.uid));
    nodes
}

pub(crate) fn sorted_relationships(graph: &Graph) -> Vec<&Relationship> {
    let mut rels: Vec<&Relationship> = graph.relationships().collect();
    rels.sort_unstable_by(|a, b| {
        (&a.from, &a.to, &a.label).cmp(&(&b.from, &b.to, &b.label))
    });
    rels
}

/// JSON-encode a value for embedding in rendered output.
pub fn json<T: Serialize>(value: &T) -> Result<String, RenderError> {
    Ok(serde_json::to_string(value)?)
}

/// YAML-encode a value, without the trailing newline serde_yaml appends.
pub fn yaml<T: Serialize>(value: &T) -> Result<String, RenderError> {
    let text = serde_yaml::to_string(value)?;
    Ok(text.trim_end_matches('\n').to_string())
}

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("static pattern"));

/// Lowercase and collapse every non-alphanumeric run to one underscore,
/// e.g. `networking.k8s.io/v1` becomes `networking_k8s_io_v1`.
pub fn underscore(value: &str) -> String {
    NON_ALNUM.replace_all(&value.to_lowercase(), "_").to_string()
}

/// Deterministic hex color derived from the value's hash.
pub fn color(value: &str) -> String {
    let digest = md5::compute(value.as_bytes());
    format!("#{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2])
}
