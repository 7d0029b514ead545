//! Cypher statement rendering for Neo4j import
//!
//! Each node becomes a `MERGE` on its UID followed by a property update, so
//! re-importing the same graph is idempotent. Relationship types are the
//! normalized uppercase form of the edge label. Label and annotation maps
//! are embedded as JSON strings since Cypher properties are flat.

use crate::graph::Node;
use crate::render::{
    Renderer, RenderError, json, sorted_nodes, sorted_relationships, underscore,
};

pub struct CypherRenderer;

impl Renderer for CypherRenderer {
    fn render(&self, graph: &crate::graph::Graph, out: &mut String) -> Result<(), RenderError> {
        for node in sorted_nodes(graph) {
            let label = if node.kind.is_empty() {
                "Resource"
            } else {
                node.kind.as_str()
            };
            out.push_str(&format!(
                "MERGE (n:{label} {{uid: {}}}) SET n += {};\n",
                json(&node.uid)?,
                properties(node)?,
            ));
        }

        for rel in sorted_relationships(graph) {
            let rel_type = if rel.label.is_empty() {
                "RELATES_TO".to_string()
            } else {
                underscore(&rel.label).to_uppercase()
            };
            out.push_str(&format!(
                "MATCH (a {{uid: {}}}), (b {{uid: {}}}) MERGE (a)-[r:{rel_type}]->(b)",
                json(&rel.from)?,
                json(&rel.to)?,
            ));
            if !rel.attrs.is_empty() {
                let assignments: Vec<String> = rel
                    .attrs
                    .iter()
                    .map(|(k, v)| Ok(format!("`{k}`: {}", json(v)?)))
                    .collect::<Result<_, RenderError>>()?;
                out.push_str(&format!(" SET r += {{{}}}", assignments.join(", ")));
            }
            out.push_str(";\n");
        }

        Ok(())
    }
}

fn properties(node: &Node) -> Result<String, RenderError> {
    let mut props = vec![
        format!("apiVersion: {}", json(&node.api_version)?),
        format!("kind: {}", json(&node.kind)?),
        format!("name: {}", json(&node.name)?),
    ];
    if !node.cluster.is_empty() {
        props.push(format!("cluster: {}", json(&node.cluster)?));
    }
    if let Some(ns) = &node.namespace {
        props.push(format!("namespace: {}", json(ns)?));
    }
    // Maps go in as JSON strings; Cypher property values must be scalar.
    if !node.labels.is_empty() {
        props.push(format!("labels: {}", json(&json(&node.labels)?)?));
    }
    if !node.annotations.is_empty() {
        props.push(format!("annotations: {}", json(&json(&node.annotations)?)?));
    }
    Ok(format!("{{{}}}", props.join(", ")))
}
