//! Graphviz DOT rendering
//!
//! Record-shaped nodes showing kind and name, filled with a color hashed
//! from the kind so each resource type gets a stable hue.

use crate::render::{Renderer, RenderError, color, sorted_nodes, sorted_relationships};

pub struct GraphvizRenderer;

impl Renderer for GraphvizRenderer {
    fn render(&self, graph: &crate::graph::Graph, out: &mut String) -> Result<(), RenderError> {
        out.push_str("digraph {\n");
        out.push_str("  rankdir=\"LR\";\n");
        out.push_str("  graph [overlap=\"false\"];\n");
        out.push_str("  node [shape=\"record\", style=\"filled\"];\n");

        for node in sorted_nodes(graph) {
            let display = if node.name.is_empty() {
                node.uid.as_str()
            } else {
                node.name.as_str()
            };
            out.push_str(&format!(
                "  \"{}\" [label=\"{{{}|{}}}\", fillcolor=\"{}\"];\n",
                escape(&node.uid),
                escape(&node.kind),
                escape(display),
                color(&node.kind),
            ));
        }

        for rel in sorted_relationships(graph) {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                escape(&rel.from),
                escape(&rel.to),
                escape(&rel.label),
            ));
        }

        out.push_str("}\n");
        Ok(())
    }
}

/// Escape the characters that are special inside DOT record labels and
/// double-quoted strings.
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '"' | '{' | '}' | '|' | '<' | '>' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}
