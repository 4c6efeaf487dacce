//! Per-kind create-or-update strategies
//!
//! Each function takes the desired object and the object as it currently
//! exists remotely, and returns the object to write back, or `None` when
//! nothing needs to change. Updates always start from the remote copy so
//! fields owned by the server or by other controllers survive.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ObjectMeta;
use serde::Serialize;
use tracing::debug;

use crate::crd::Klusterlet;
use crate::kube_utils::{deterministic_hash, is_subset};
use crate::resource::ResourceObject;
use crate::{Error, Result};

/// Annotation recording the hash of the last applied deployment spec
pub const SPEC_HASH_ANNOTATION: &str = "xcm.open-cluster-management.io/spec-hash";

fn to_value<T: Serialize>(value: &T, kind: &str) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
}

fn merge_map(
    desired: &Option<BTreeMap<String, String>>,
    existing: &mut Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return false;
    };
    let target = existing.get_or_insert_with(BTreeMap::new);
    let mut changed = false;
    for (k, v) in desired {
        if target.get(k) != Some(v) {
            target.insert(k.clone(), v.clone());
            changed = true;
        }
    }
    changed
}

/// Add required labels and annotations; never removes foreign ones
fn merge_metadata(desired: &ObjectMeta, existing: &mut ObjectMeta) -> bool {
    let labels = merge_map(&desired.labels, &mut existing.labels);
    let annotations = merge_map(&desired.annotations, &mut existing.annotations);
    labels || annotations
}

/// Prepare a desired object for its first create
pub fn for_create(desired: &ResourceObject) -> Result<ResourceObject> {
    match desired {
        ResourceObject::Deployment(d) => {
            let mut d = d.clone();
            let hash = spec_hash(&d)?;
            d.metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(SPEC_HASH_ANNOTATION.to_string(), hash);
            Ok(ResourceObject::Deployment(d))
        }
        other => Ok(other.clone()),
    }
}

/// Dispatch to the strategy for the desired object's kind
pub fn merge(desired: &ResourceObject, existing: ResourceObject) -> Result<Option<ResourceObject>> {
    use ResourceObject as R;
    Ok(match (desired, existing) {
        (R::Namespace(d), R::Namespace(mut e)) => {
            merge_metadata(&d.metadata, &mut e.metadata).then_some(R::Namespace(e))
        }
        (R::ServiceAccount(d), R::ServiceAccount(mut e)) => {
            merge_metadata(&d.metadata, &mut e.metadata).then_some(R::ServiceAccount(e))
        }
        (R::Service(d), R::Service(e)) => service(d, e)?.map(R::Service),
        (R::Secret(d), R::Secret(e)) => secret(d, e).map(R::Secret),
        (R::ClusterRole(d), R::ClusterRole(e)) => cluster_role(d, e)?.map(R::ClusterRole),
        (R::ClusterRoleBinding(d), R::ClusterRoleBinding(e)) => {
            cluster_role_binding(d, e)?.map(R::ClusterRoleBinding)
        }
        (R::CustomResourceDefinition(d), R::CustomResourceDefinition(e)) => {
            crd(d, e)?.map(R::CustomResourceDefinition)
        }
        (R::Deployment(d), R::Deployment(e)) => deployment(d, e)?.map(R::Deployment),
        (R::Klusterlet(d), R::Klusterlet(e)) => klusterlet(d, e).map(R::Klusterlet),
        (d, e) => {
            return Err(Error::internal_with_context(
                "reconcile",
                format!(
                    "remote object for {} has a different kind: {}",
                    d.describe(),
                    e.describe()
                ),
            ))
        }
    })
}

/// Create-or-leave: only the owned routing fields are converged
fn service(desired: &Service, mut existing: Service) -> Result<Option<Service>> {
    let mut changed = merge_metadata(&desired.metadata, &mut existing.metadata);

    if let Some(want) = &desired.spec {
        let have = existing.spec.get_or_insert_with(Default::default);
        let owned = serde_json::json!({
            "type": want.type_,
            "selector": want.selector,
            "ports": want.ports,
        });
        if !is_subset(&owned, &to_value(have, "Service")?) {
            have.type_ = want.type_.clone();
            have.selector = want.selector.clone();
            have.ports = want.ports.clone();
            changed = true;
        }
    }

    Ok(changed.then_some(existing))
}

/// Create-or-leave: desired keys are written, foreign keys are kept
fn secret(desired: &Secret, mut existing: Secret) -> Option<Secret> {
    let mut changed = merge_metadata(&desired.metadata, &mut existing.metadata);

    if let Some(want) = &desired.data {
        let have = existing.data.get_or_insert_with(BTreeMap::new);
        for (k, v) in want {
            if have.get(k) != Some(v) {
                have.insert(k.clone(), v.clone());
                changed = true;
            }
        }
    }
    if let Some(want) = &desired.string_data {
        // stringData is write-only; compare against the decoded data
        let have = existing.data.get_or_insert_with(BTreeMap::new);
        for (k, v) in want {
            if have.get(k).map(|b| b.0.as_slice()) != Some(v.as_bytes()) {
                have.insert(k.clone(), k8s_openapi::ByteString(v.as_bytes().to_vec()));
                changed = true;
            }
        }
    }

    changed.then_some(existing)
}

fn cluster_role(desired: &ClusterRole, mut existing: ClusterRole) -> Result<Option<ClusterRole>> {
    let meta = merge_metadata(&desired.metadata, &mut existing.metadata);
    let want = serde_json::json!({
        "rules": desired.rules,
        "aggregationRule": desired.aggregation_rule,
    });
    let have = to_value(&existing, "ClusterRole")?;
    if is_subset(&want, &have) {
        return Ok(meta.then_some(existing));
    }
    existing.rules = desired.rules.clone();
    existing.aggregation_rule = desired.aggregation_rule.clone();
    Ok(Some(existing))
}

fn cluster_role_binding(
    desired: &ClusterRoleBinding,
    mut existing: ClusterRoleBinding,
) -> Result<Option<ClusterRoleBinding>> {
    let meta = merge_metadata(&desired.metadata, &mut existing.metadata);
    let want = serde_json::json!({
        "subjects": desired.subjects,
        "roleRef": desired.role_ref,
    });
    let have = to_value(&existing, "ClusterRoleBinding")?;
    if is_subset(&want, &have) {
        return Ok(meta.then_some(existing));
    }
    existing.subjects = desired.subjects.clone();
    existing.role_ref = desired.role_ref.clone();
    Ok(Some(existing))
}

fn crd(
    desired: &CustomResourceDefinition,
    mut existing: CustomResourceDefinition,
) -> Result<Option<CustomResourceDefinition>> {
    let meta = merge_metadata(&desired.metadata, &mut existing.metadata);
    let want = to_value(&desired.spec, "CustomResourceDefinition")?;
    let have = to_value(&existing.spec, "CustomResourceDefinition")?;
    if is_subset(&want, &have) {
        return Ok(meta.then_some(existing));
    }
    existing.spec = desired.spec.clone();
    Ok(Some(existing))
}

fn spec_hash(deployment: &Deployment) -> Result<String> {
    let spec = serde_json::to_string(&deployment.spec)
        .map_err(|e| Error::serialization_for_kind("Deployment", e.to_string()))?;
    Ok(deterministic_hash(&spec))
}

/// Generation-aware: skip when the recorded spec hash matches, otherwise
/// write the desired spec onto the fetched copy so the update is
/// conditional on the observed `resourceVersion`
fn deployment(desired: &Deployment, mut existing: Deployment) -> Result<Option<Deployment>> {
    let hash = spec_hash(desired)?;
    let meta = merge_metadata(&desired.metadata, &mut existing.metadata);
    let recorded = existing
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(SPEC_HASH_ANNOTATION))
        .cloned();

    if recorded.as_deref() == Some(hash.as_str()) && !meta {
        return Ok(None);
    }

    debug!(
        deployment = existing.metadata.name.as_deref().unwrap_or_default(),
        generation = existing.metadata.generation.unwrap_or_default(),
        resource_version = existing.metadata.resource_version.as_deref().unwrap_or_default(),
        "updating deployment"
    );
    existing.spec = desired.spec.clone();
    existing
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(SPEC_HASH_ANNOTATION.to_string(), hash);
    Ok(Some(existing))
}

/// Spec-only merge: everything but `spec` stays as the remote has it
fn klusterlet(desired: &Klusterlet, existing: Klusterlet) -> Option<Klusterlet> {
    if desired.spec == existing.spec {
        return None;
    }
    let mut updated = existing;
    updated.spec = desired.spec.clone();
    Some(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Namespace, ServicePort, ServiceSpec};
    use k8s_openapi::api::rbac::v1::{PolicyRule, RoleRef, Subject};
    use k8s_openapi::ByteString;

    use crate::crd::KlusterletSpec;

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.into()),
            labels: Some(BTreeMap::from([("app".to_string(), name.to_string())])),
            ..Default::default()
        }
    }

    fn remote(mut meta: ObjectMeta) -> ObjectMeta {
        meta.resource_version = Some("42".into());
        meta.uid = Some("uid-1".into());
        meta
    }

    #[test]
    fn namespace_present_and_unchanged_is_left_alone() {
        let desired = ResourceObject::Namespace(Namespace {
            metadata: meta("agent"),
            ..Default::default()
        });
        let existing = ResourceObject::Namespace(Namespace {
            metadata: remote(meta("agent")),
            ..Default::default()
        });
        assert!(merge(&desired, existing).unwrap().is_none());
    }

    #[test]
    fn namespace_missing_label_is_added_keeping_foreign_labels() {
        let desired = ResourceObject::Namespace(Namespace {
            metadata: meta("agent"),
            ..Default::default()
        });
        let mut existing_meta = remote(ObjectMeta {
            name: Some("agent".into()),
            ..Default::default()
        });
        existing_meta.labels = Some(BTreeMap::from([("team".to_string(), "x".to_string())]));
        let existing = ResourceObject::Namespace(Namespace {
            metadata: existing_meta,
            ..Default::default()
        });

        let Some(ResourceObject::Namespace(updated)) = merge(&desired, existing).unwrap() else {
            panic!("expected update");
        };
        let labels = updated.metadata.labels.unwrap();
        assert_eq!(labels["app"], "agent");
        assert_eq!(labels["team"], "x");
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("42"));
    }

    fn svc(node_port: Option<i32>, port: i32) -> Service {
        Service {
            metadata: meta("cp"),
            spec: Some(ServiceSpec {
                type_: Some("LoadBalancer".into()),
                ports: Some(vec![ServicePort {
                    port,
                    node_port,
                    ..Default::default()
                }]),
                cluster_ip: node_port.map(|_| "10.0.0.1".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn service_with_server_allocated_fields_is_unchanged() {
        let desired = svc(None, 443);
        let mut existing = svc(Some(31000), 443);
        existing.metadata = remote(existing.metadata);
        assert!(service(&desired, existing).unwrap().is_none());
    }

    #[test]
    fn service_port_change_is_converged_on_remote_copy() {
        let desired = svc(None, 8443);
        let existing = svc(Some(31000), 443);
        let updated = service(&desired, existing).unwrap().unwrap();
        let spec = updated.spec.unwrap();
        assert_eq!(spec.ports.unwrap()[0].port, 8443);
        // clusterIP is owned by the server and survives
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn secret_data_merge() {
        let desired = Secret {
            metadata: meta("s"),
            data: Some(BTreeMap::from([(
                "kubeconfig".to_string(),
                ByteString(b"new".to_vec()),
            )])),
            ..Default::default()
        };
        let same = Secret {
            metadata: remote(meta("s")),
            data: Some(BTreeMap::from([
                ("kubeconfig".to_string(), ByteString(b"new".to_vec())),
                ("extra".to_string(), ByteString(b"x".to_vec())),
            ])),
            ..Default::default()
        };
        assert!(secret(&desired, same.clone()).is_none());

        let mut stale = same;
        stale
            .data
            .as_mut()
            .unwrap()
            .insert("kubeconfig".into(), ByteString(b"old".to_vec()));
        let updated = secret(&desired, stale).unwrap();
        let data = updated.data.unwrap();
        assert_eq!(data["kubeconfig"].0, b"new");
        assert_eq!(data["extra"].0, b"x");
    }

    #[test]
    fn cluster_role_replaced_only_when_rules_differ() {
        let role = |verbs: &[&str]| ClusterRole {
            metadata: meta("r"),
            rules: Some(vec![PolicyRule {
                api_groups: Some(vec!["".into()]),
                resources: Some(vec!["secrets".into()]),
                verbs: verbs.iter().map(|v| v.to_string()).collect(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(cluster_role(&role(&["get"]), role(&["get"])).unwrap().is_none());
        let updated = cluster_role(&role(&["get", "list"]), role(&["get"]))
            .unwrap()
            .unwrap();
        assert_eq!(updated.rules.unwrap()[0].verbs, vec!["get", "list"]);
    }

    #[test]
    fn cluster_role_binding_replaced_when_subjects_differ() {
        let binding = |ns: &str| ClusterRoleBinding {
            metadata: meta("b"),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".into(),
                kind: "ClusterRole".into(),
                name: "cluster-admin".into(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".into(),
                name: "sa".into(),
                namespace: Some(ns.into()),
                ..Default::default()
            }]),
        };
        assert!(cluster_role_binding(&binding("a"), binding("a"))
            .unwrap()
            .is_none());
        assert!(cluster_role_binding(&binding("b"), binding("a"))
            .unwrap()
            .is_some());
    }

    fn deploy(replicas: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                namespace: Some("ns".into()),
                ..meta("cp")
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn deployment_created_with_spec_hash() {
        let ResourceObject::Deployment(created) =
            for_create(&ResourceObject::Deployment(deploy(1))).unwrap()
        else {
            panic!("expected deployment");
        };
        let hash = &created.metadata.annotations.unwrap()[SPEC_HASH_ANNOTATION];
        assert_eq!(hash, &spec_hash(&deploy(1)).unwrap());
    }

    #[test]
    fn deployment_with_matching_hash_is_skipped() {
        let ResourceObject::Deployment(mut existing) =
            for_create(&ResourceObject::Deployment(deploy(1))).unwrap()
        else {
            panic!("expected deployment");
        };
        existing.metadata.generation = Some(3);
        existing.metadata.resource_version = Some("100".into());
        // server defaulting changes the stored spec, the hash still matches
        existing.spec.as_mut().unwrap().revision_history_limit = Some(10);

        assert!(deployment(&deploy(1), existing).unwrap().is_none());
    }

    #[test]
    fn deployment_update_carries_observed_resource_version() {
        let ResourceObject::Deployment(mut existing) =
            for_create(&ResourceObject::Deployment(deploy(1))).unwrap()
        else {
            panic!("expected deployment");
        };
        existing.metadata.generation = Some(3);
        existing.metadata.resource_version = Some("100".into());

        let updated = deployment(&deploy(2), existing).unwrap().unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("100"));
        assert_eq!(updated.metadata.generation, Some(3));
        assert_eq!(updated.spec.unwrap().replicas, Some(2));
        assert_eq!(
            updated.metadata.annotations.unwrap()[SPEC_HASH_ANNOTATION],
            spec_hash(&deploy(2)).unwrap()
        );
    }

    #[test]
    fn deployment_without_hash_is_adopted() {
        let existing = deploy(1);
        assert!(deployment(&deploy(1), existing).unwrap().is_some());
    }

    #[test]
    fn klusterlet_spec_only_merge_preserves_metadata() {
        let desired = Klusterlet::new(
            "klusterlet",
            KlusterletSpec {
                cluster_name: "cluster-new".into(),
                namespace: "agent".into(),
                ..Default::default()
            },
        );
        let mut existing = Klusterlet::new(
            "klusterlet",
            KlusterletSpec {
                cluster_name: "cluster-old".into(),
                namespace: "agent".into(),
                ..Default::default()
            },
        );
        existing.metadata.finalizers = Some(vec![
            "operator.open-cluster-management.io/klusterlet-cleanup".into(),
        ]);
        existing.metadata.resource_version = Some("7".into());

        let updated = klusterlet(&desired, existing.clone()).unwrap();
        assert_eq!(updated.spec.cluster_name, "cluster-new");
        assert_eq!(updated.metadata.finalizers, existing.metadata.finalizers);
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("7"));

        assert!(klusterlet(&desired, updated).is_none());
    }

    #[test]
    fn kind_mismatch_is_an_internal_error() {
        let desired = ResourceObject::Namespace(Namespace {
            metadata: meta("x"),
            ..Default::default()
        });
        let existing = ResourceObject::Secret(Secret {
            metadata: meta("x"),
            ..Default::default()
        });
        assert!(matches!(
            merge(&desired, existing),
            Err(Error::Internal { .. })
        ));
    }
}
