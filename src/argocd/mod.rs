//! ArgoCD application ownership resolution
//!
//! ArgoCD links managed resources to their application through tracking
//! metadata rather than native owner references, so application subtrees
//! have to be reconstructed: discover every object in the cluster, pick the
//! direct children by tracking annotation or instance label, then follow
//! native owner references downward for the transitive descendants.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use kube::core::DynamicObject;

use crate::discovery::{DiscoveryOptions, ObjectLister, ResourceType, discover_all};
use crate::graph::{Graph, GraphError, GroupHandler};

/// The apiVersion this handler should be registered under.
pub const API_VERSION: &str = "argoproj.io/v1alpha1";

/// Annotation-based tracking: the value is prefixed with the owning
/// application's name, e.g. `myapp:apps/Deployment/default/web`.
const TRACKING_ANNOTATION: &str = "argocd.argoproj.io/tracking-id";

/// Label-based tracking: the value is exactly the application name.
const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";

/// Graph handler for the `argoproj.io/v1alpha1` group.
pub struct ArgoHandler<L> {
    lister: L,
    options: DiscoveryOptions,
}

impl<L: ObjectLister> ArgoHandler<L> {
    pub fn new(lister: L) -> Self {
        ArgoHandler {
            lister,
            options: DiscoveryOptions::default(),
        }
    }

    pub fn with_options(lister: L, options: DiscoveryOptions) -> Self {
        ArgoHandler { lister, options }
    }

    /// Reconstruct one application's subtree from a full-cluster snapshot.
    async fn application(&self, graph: &mut Graph, app: &DynamicObject) -> Result<(), GraphError> {
        let app_uid = graph.upsert_object(app)?;
        let app_name = app.metadata.name.clone().unwrap_or_default();

        let snapshot = discover_all(&self.lister, &self.options).await?;
        tracing::debug!(
            "application {app_name}: {} objects discovered, {} resource types skipped",
            snapshot.objects.len(),
            snapshot.failures.len()
        );

        attach_children(graph, &app_uid, &app_name, &snapshot.objects)
    }

    /// Connect an application-set to every application it owns.
    async fn application_set(
        &self,
        graph: &mut Graph,
        appset: &DynamicObject,
    ) -> Result<(), GraphError> {
        let set_uid = graph.upsert_object(appset)?;
        let set_name = appset.metadata.name.clone().unwrap_or_default();

        for app in self.list_applications().await? {
            let owned = app
                .metadata
                .owner_references
                .iter()
                .flatten()
                .any(|r| r.kind == "ApplicationSet" && r.name == set_name);
            if !owned {
                continue;
            }

            let app_uid = graph.upsert_object(&app)?;
            graph.relate(&set_uid, "Application", &app_uid);
            self.application(graph, &app).await?;
        }

        Ok(())
    }

    /// Connect a project to every application declaring it.
    async fn project(&self, graph: &mut Graph, project: &DynamicObject) -> Result<(), GraphError> {
        let project_uid = graph.upsert_object(project)?;
        let project_name = project.metadata.name.clone().unwrap_or_default();

        for app in self.list_applications().await? {
            let app_project = app
                .data
                .get("spec")
                .and_then(|s| s.get("project"))
                .and_then(|p| p.as_str())
                .ok_or_else(|| GraphError::MalformedObject {
                    kind: "Application".to_string(),
                    name: app.metadata.name.clone().unwrap_or_default(),
                    field: "spec.project".to_string(),
                })?;
            if app_project != project_name {
                continue;
            }

            let app_uid = graph.upsert_object(&app)?;
            graph.relate(&project_uid, "Application", &app_uid);
            self.application(graph, &app).await?;
        }

        Ok(())
    }

    async fn list_applications(&self) -> Result<Vec<DynamicObject>, GraphError> {
        Ok(self.lister.list(&application_resource()).await?)
    }
}

#[async_trait]
impl<L: ObjectLister> GroupHandler for ArgoHandler<L> {
    async fn handle(&self, graph: &mut Graph, obj: &DynamicObject) -> Result<(), GraphError> {
        match obj.types.as_ref().map(|t| t.kind.as_str()) {
            Some("Application") => self.application(graph, obj).await,
            Some("ApplicationSet") => self.application_set(graph, obj).await,
            Some("AppProject") => self.project(graph, obj).await,
            _ => Ok(()),
        }
    }
}

fn application_resource() -> ResourceType {
    ResourceType::new("argoproj.io", "v1alpha1", "Application", "applications", true)
}

/// Does this object carry tracking metadata naming the application?
fn is_direct_child(obj: &DynamicObject, app_name: &str) -> bool {
    if app_name.is_empty() {
        return false;
    }

    if let Some(id) = obj
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(TRACKING_ANNOTATION))
    {
        if id
            .strip_prefix(app_name)
            .is_some_and(|rest| rest.starts_with(':'))
        {
            return true;
        }
    }

    obj.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(INSTANCE_LABEL))
        .is_some_and(|v| v == app_name)
}

/// Connect the application's direct children, then expand each one's
/// owner-reference descendants. Tracking metadata is only consulted for the
/// direct tier; everything below follows native owner references.
fn attach_children(
    graph: &mut Graph,
    app_uid: &str,
    app_name: &str,
    objects: &[DynamicObject],
) -> Result<(), GraphError> {
    // Child map across the whole snapshot: owner UID -> owned objects.
    let mut children: HashMap<&str, Vec<&DynamicObject>> = HashMap::new();
    for obj in objects {
        for owner in obj.metadata.owner_references.iter().flatten() {
            children.entry(owner.uid.as_str()).or_default().push(obj);
        }
    }

    let mut done = HashSet::new();
    for obj in objects {
        if !is_direct_child(obj, app_name) {
            continue;
        }

        let child_uid = graph.upsert_object(obj)?;
        if child_uid == app_uid {
            // An application's own tracking label must not self-link.
            continue;
        }
        let kind = node_kind(obj);
        graph.relate(app_uid, &kind, &child_uid);

        let mut path = vec![child_uid.clone()];
        attach_descendants(graph, &child_uid, &children, &mut path, &mut done)?;
    }

    Ok(())
}

fn attach_descendants(
    graph: &mut Graph,
    parent_uid: &str,
    children: &HashMap<&str, Vec<&DynamicObject>>,
    path: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Result<(), GraphError> {
    let Some(kids) = children.get(parent_uid) else {
        return Ok(());
    };

    for kid in kids {
        let kid_uid = graph.upsert_object(kid)?;
        if path.contains(&kid_uid) {
            return Err(GraphError::OwnershipCycle {
                uid: kid_uid,
                kind: node_kind(kid),
                name: kid.metadata.name.clone().unwrap_or_default(),
            });
        }

        let kind = node_kind(kid);
        graph.relate(parent_uid, &kind, &kid_uid);

        // A child reachable through two parents is walked once.
        if !done.insert(kid_uid.clone()) {
            continue;
        }

        path.push(kid_uid.clone());
        attach_descendants(graph, &kid_uid, children, path, done)?;
        path.pop();
    }

    Ok(())
}

fn node_kind(obj: &DynamicObject) -> String {
    obj.types
        .as_ref()
        .map(|t| t.kind.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::core::{ObjectMeta, TypeMeta};

    fn object(api_version: &str, kind: &str, name: &str, uid: &str) -> DynamicObject {
        DynamicObject {
            types: Some(TypeMeta {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    fn annotated(mut obj: DynamicObject, key: &str, value: &str) -> DynamicObject {
        obj.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        obj
    }

    fn labeled(mut obj: DynamicObject, key: &str, value: &str) -> DynamicObject {
        obj.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        obj
    }

    fn owned_by(mut obj: DynamicObject, kind: &str, name: &str, uid: &str) -> DynamicObject {
        obj.metadata
            .owner_references
            .get_or_insert_with(Vec::new)
            .push(OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: kind.to_string(),
                name: name.to_string(),
                uid: uid.to_string(),
                ..Default::default()
            });
        obj
    }

    #[test]
    fn test_direct_child_classification() {
        let tracked = annotated(
            object("apps/v1", "Deployment", "web", "dep-uid"),
            TRACKING_ANNOTATION,
            "myapp:apps/Deployment/default/web",
        );
        assert!(is_direct_child(&tracked, "myapp"));

        let instance = labeled(
            object("v1", "Service", "web", "svc-uid"),
            INSTANCE_LABEL,
            "myapp",
        );
        assert!(is_direct_child(&instance, "myapp"));

        let unrelated = object("v1", "ConfigMap", "other", "cm-uid");
        assert!(!is_direct_child(&unrelated, "myapp"));

        // Prefix must be the full application name followed by a colon.
        let other_app = annotated(
            object("apps/v1", "Deployment", "web", "dep-uid"),
            TRACKING_ANNOTATION,
            "myapp2:apps/Deployment/default/web",
        );
        assert!(!is_direct_child(&other_app, "myapp"));
    }

    #[test]
    fn test_attach_children_walks_owner_references() {
        let mut graph = Graph::new();
        let app = object("argoproj.io/v1alpha1", "Application", "myapp", "app-uid");
        let app_uid = graph.upsert_object(&app).unwrap();

        let deployment = labeled(
            object("apps/v1", "Deployment", "web", "dep-uid"),
            INSTANCE_LABEL,
            "myapp",
        );
        let replicaset = owned_by(
            object("apps/v1", "ReplicaSet", "web-abc", "rs-uid"),
            "Deployment",
            "web",
            "dep-uid",
        );
        let pod = owned_by(
            object("v1", "Pod", "web-abc-xyz", "pod-uid"),
            "ReplicaSet",
            "web-abc",
            "rs-uid",
        );

        let objects = vec![deployment, replicaset, pod];
        attach_children(&mut graph, &app_uid, "myapp", &objects).unwrap();

        // app -> deployment (tracking), deployment -> rs -> pod (owner refs).
        assert!(graph.incoming("dep-uid").iter().any(|r| r.from == "app-uid"));
        assert!(graph.incoming("rs-uid").iter().any(|r| r.from == "dep-uid"));
        assert!(graph.incoming("pod-uid").iter().any(|r| r.from == "rs-uid"));
    }

    #[test]
    fn test_attach_children_detects_owner_cycle() {
        let mut graph = Graph::new();
        let app = object("argoproj.io/v1alpha1", "Application", "myapp", "app-uid");
        let app_uid = graph.upsert_object(&app).unwrap();

        // a and b own each other.
        let a = owned_by(
            labeled(
                object("v1", "ConfigMap", "a", "a-uid"),
                INSTANCE_LABEL,
                "myapp",
            ),
            "ConfigMap",
            "b",
            "b-uid",
        );
        let b = owned_by(
            object("v1", "ConfigMap", "b", "b-uid"),
            "ConfigMap",
            "a",
            "a-uid",
        );

        let objects = vec![a, b];
        let err = attach_children(&mut graph, &app_uid, "myapp", &objects).unwrap_err();
        assert!(matches!(err, GraphError::OwnershipCycle { .. }));
    }
}
