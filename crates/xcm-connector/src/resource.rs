//! The closed set of resource kinds the connector knows how to apply

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use kube::{Resource, ResourceExt};

use crate::crd::Klusterlet;

/// Kind tag of a [`ResourceObject`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// `Namespace`
    Namespace,
    /// `Service`
    Service,
    /// `ServiceAccount`
    ServiceAccount,
    /// `Secret`
    Secret,
    /// `Deployment`
    Deployment,
    /// `ClusterRole`
    ClusterRole,
    /// `ClusterRoleBinding`
    ClusterRoleBinding,
    /// `CustomResourceDefinition`
    CustomResourceDefinition,
    /// `Klusterlet`
    Klusterlet,
}

impl ResourceKind {
    /// Every supported kind
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::Namespace,
        ResourceKind::Service,
        ResourceKind::ServiceAccount,
        ResourceKind::Secret,
        ResourceKind::Deployment,
        ResourceKind::ClusterRole,
        ResourceKind::ClusterRoleBinding,
        ResourceKind::CustomResourceDefinition,
        ResourceKind::Klusterlet,
    ];

    /// `apiVersion` this kind is served under
    pub fn api_version(self) -> String {
        match self {
            ResourceKind::Namespace => Namespace::api_version(&()).into_owned(),
            ResourceKind::Service => Service::api_version(&()).into_owned(),
            ResourceKind::ServiceAccount => ServiceAccount::api_version(&()).into_owned(),
            ResourceKind::Secret => Secret::api_version(&()).into_owned(),
            ResourceKind::Deployment => Deployment::api_version(&()).into_owned(),
            ResourceKind::ClusterRole => ClusterRole::api_version(&()).into_owned(),
            ResourceKind::ClusterRoleBinding => ClusterRoleBinding::api_version(&()).into_owned(),
            ResourceKind::CustomResourceDefinition => {
                CustomResourceDefinition::api_version(&()).into_owned()
            }
            ResourceKind::Klusterlet => Klusterlet::api_version(&()).into_owned(),
        }
    }

    /// `kind` discriminator
    pub fn kind(self) -> &'static str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::Service => "Service",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::CustomResourceDefinition => "CustomResourceDefinition",
            ResourceKind::Klusterlet => "Klusterlet",
        }
    }

    /// Whether objects of this kind live in a namespace
    pub fn is_namespaced(self) -> bool {
        matches!(
            self,
            ResourceKind::Service
                | ResourceKind::ServiceAccount
                | ResourceKind::Secret
                | ResourceKind::Deployment
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Identity of an object on the remote: kind, namespace (if any) and name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Resource kind
    pub kind: ResourceKind,
    /// Namespace, `None` for cluster-scoped kinds
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Key from borrowed parts
    pub fn new(kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            kind,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// A decoded, typed resource ready to be reconciled
#[derive(Clone, Debug)]
pub enum ResourceObject {
    /// A `Namespace`
    Namespace(Namespace),
    /// A `Service`
    Service(Service),
    /// A `ServiceAccount`
    ServiceAccount(ServiceAccount),
    /// A `Secret`
    Secret(Secret),
    /// A `Deployment`
    Deployment(Deployment),
    /// A `ClusterRole`
    ClusterRole(ClusterRole),
    /// A `ClusterRoleBinding`
    ClusterRoleBinding(ClusterRoleBinding),
    /// A `CustomResourceDefinition`
    CustomResourceDefinition(CustomResourceDefinition),
    /// A `Klusterlet`
    Klusterlet(Klusterlet),
    /// A well-formed object whose kind is outside the supported set
    Unrecognized(DynamicObject),
}

impl ResourceObject {
    /// Kind tag, or `None` for unrecognized objects
    pub fn kind(&self) -> Option<ResourceKind> {
        Some(match self {
            ResourceObject::Namespace(_) => ResourceKind::Namespace,
            ResourceObject::Service(_) => ResourceKind::Service,
            ResourceObject::ServiceAccount(_) => ResourceKind::ServiceAccount,
            ResourceObject::Secret(_) => ResourceKind::Secret,
            ResourceObject::Deployment(_) => ResourceKind::Deployment,
            ResourceObject::ClusterRole(_) => ResourceKind::ClusterRole,
            ResourceObject::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
            ResourceObject::CustomResourceDefinition(_) => ResourceKind::CustomResourceDefinition,
            ResourceObject::Klusterlet(_) => ResourceKind::Klusterlet,
            ResourceObject::Unrecognized(_) => return None,
        })
    }

    /// Object name
    pub fn name(&self) -> String {
        match self {
            ResourceObject::Namespace(o) => o.name_any(),
            ResourceObject::Service(o) => o.name_any(),
            ResourceObject::ServiceAccount(o) => o.name_any(),
            ResourceObject::Secret(o) => o.name_any(),
            ResourceObject::Deployment(o) => o.name_any(),
            ResourceObject::ClusterRole(o) => o.name_any(),
            ResourceObject::ClusterRoleBinding(o) => o.name_any(),
            ResourceObject::CustomResourceDefinition(o) => o.name_any(),
            ResourceObject::Klusterlet(o) => o.name_any(),
            ResourceObject::Unrecognized(o) => o.name_any(),
        }
    }

    /// Object namespace, if set
    pub fn namespace(&self) -> Option<String> {
        match self {
            ResourceObject::Service(o) => o.namespace(),
            ResourceObject::ServiceAccount(o) => o.namespace(),
            ResourceObject::Secret(o) => o.namespace(),
            ResourceObject::Deployment(o) => o.namespace(),
            ResourceObject::Unrecognized(o) => o.namespace(),
            _ => None,
        }
    }

    /// Remote identity; `None` for unrecognized objects
    pub fn key(&self) -> Option<ObjectKey> {
        let kind = self.kind()?;
        Some(ObjectKey {
            kind,
            namespace: self.namespace(),
            name: self.name(),
        })
    }

    /// Human-readable `kind name` for logs, including unrecognized objects
    pub fn describe(&self) -> String {
        match self {
            ResourceObject::Unrecognized(o) => {
                let kind = o
                    .types
                    .as_ref()
                    .map(|t| format!("{}/{}", t.api_version, t.kind))
                    .unwrap_or_else(|| "<untyped>".to_string());
                format!("{} {}", kind, o.name_any())
            }
            other => match other.key() {
                Some(key) => key.to_string(),
                None => other.name(),
            },
        }
    }
}
