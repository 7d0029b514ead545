//! Command-line interface
//!
//! Lists the requested resource kinds, builds the graph, and renders it in
//! the chosen format to stdout or a file.

mod logging;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::argocd::{self, ArgoHandler};
use crate::discovery::{KubeLister, ObjectLister, ResourceType};
use crate::graph::{GraphBuilder, GraphOptions, SyntheticRoots};
use crate::kube::connect;
use crate::render::OutputRegistry;

#[derive(Debug, Parser)]
#[command(
    name = "kubegraph",
    about = "Render a graph of Kubernetes resources and their relationships",
    version
)]
pub struct Args {
    /// Resource kinds or plurals to graph, e.g. `deployments` or `Application`.
    #[arg(required = true)]
    pub kinds: Vec<String>,

    /// Output format.
    #[arg(short = 'o', long = "output", default_value = "cypher")]
    pub output: String,

    /// Restrict listing to one namespace.
    #[arg(short = 'n', long = "namespace", conflicts_with = "all_namespaces")]
    pub namespace: Option<String>,

    /// List across every namespace.
    #[arg(short = 'A', long = "all-namespaces")]
    pub all_namespaces: bool,

    /// Write output to a file instead of stdout.
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Allow distinctly-labeled parallel relationships between two nodes.
    #[arg(long = "multi-edge")]
    pub multi_edge: bool,

    /// Enable debug logging on stderr.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

pub async fn run(args: Args) -> Result<()> {
    logging::init_logging(args.debug);

    // Fail on a bad format before touching the network.
    let registry = OutputRegistry::new();
    if !registry.formats().contains(&args.output.as_str()) {
        bail!(
            "unknown output format \"{}\", expected one of: {}",
            args.output,
            registry.formats().join(", ")
        );
    }

    let cluster = connect().await?;
    let lister = KubeLister::new(cluster.client.clone());

    let known = lister.api_resources().await.context("API discovery failed")?;
    let mut objects = Vec::new();
    for kind in &args.kinds {
        let rt = match_resource(&known, kind)
            .with_context(|| format!("no API resource matches \"{kind}\""))?;
        let listed = match (&args.namespace, rt.namespaced) {
            (Some(ns), true) => lister.list_namespaced(rt, ns).await?,
            _ => lister.list(rt).await?,
        };
        tracing::debug!("listed {} {}", listed.len(), rt.qualified_name());
        objects.extend(listed);
    }

    let builder = GraphBuilder::new()
        .roots(Box::new(SyntheticRoots::new(cluster.cluster_name.clone())))
        .handler(
            argocd::API_VERSION,
            Box::new(ArgoHandler::new(KubeLister::new(cluster.client.clone()))),
        )
        .options(GraphOptions {
            multi_edge: args.multi_edge,
        });

    let total = objects.len();
    let mut processed = 0usize;
    let (graph, report) = builder
        .build(&objects, || {
            processed += 1;
            tracing::debug!("processed {processed}/{total} objects");
        })
        .await;

    if !report.is_empty() {
        tracing::warn!("{report}");
    }
    tracing::info!(
        "built graph with {} nodes and {} relationships",
        graph.node_count(),
        graph.relationship_count()
    );

    let out = registry.render_to_string(&args.output, &graph)?;
    match &args.file {
        Some(path) => std::fs::write(path, out)
            .with_context(|| format!("writing {}", path.display()))?,
        None => std::io::stdout().lock().write_all(out.as_bytes())?,
    }

    Ok(())
}

/// Match a user-supplied kind against discovered resources, by kind
/// (case-insensitive) or plural name.
fn match_resource<'a>(known: &'a [ResourceType], kind: &str) -> Option<&'a ResourceType> {
    let lowered = kind.to_lowercase();
    known
        .iter()
        .find(|rt| rt.resource.kind.to_lowercase() == lowered || rt.resource.plural == lowered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_resource_by_kind_and_plural() {
        let known = vec![
            ResourceType::new("apps", "v1", "Deployment", "deployments", true),
            ResourceType::new("", "v1", "Pod", "pods", true),
        ];

        assert!(match_resource(&known, "deployment").is_some());
        assert!(match_resource(&known, "Deployment").is_some());
        assert!(match_resource(&known, "deployments").is_some());
        assert!(match_resource(&known, "pods").is_some());
        assert!(match_resource(&known, "widgets").is_none());
    }
}
