//! Decoding of rendered documents into typed [`ResourceObject`]s

use std::collections::HashMap;
use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use serde::de::DeserializeOwned;

use crate::crd::Klusterlet;
use crate::resource::{ResourceKind, ResourceObject};

type Decoder = Box<dyn Fn(serde_json::Value) -> serde_json::Result<ResourceObject> + Send + Sync>;

/// Maps `(apiVersion, kind)` to a typed decoder.
///
/// Built once and handed to the renderer; there is no way to register a
/// kind after construction.
pub struct KindRegistry {
    decoders: HashMap<(String, String), Decoder>,
}

impl fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("KindRegistry").field("kinds", &kinds).finish()
    }
}

/// Why a rendered document could not be decoded
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// `apiVersion` or `kind` is absent
    #[error("document has no {0} field")]
    MissingTypeField(&'static str),

    /// The document does not match its kind's schema
    #[error("invalid {kind}: {source}")]
    Invalid {
        /// `apiVersion/kind` of the document
        kind: String,
        /// Deserialization failure
        #[source]
        source: serde_json::Error,
    },
}

impl KindRegistry {
    /// The registry covering every [`ResourceKind`]
    pub fn standard() -> Self {
        RegistryBuilder::default()
            .register(ResourceKind::Namespace, ResourceObject::Namespace as fn(Namespace) -> _)
            .register(ResourceKind::Service, ResourceObject::Service as fn(Service) -> _)
            .register(
                ResourceKind::ServiceAccount,
                ResourceObject::ServiceAccount as fn(ServiceAccount) -> _,
            )
            .register(ResourceKind::Secret, ResourceObject::Secret as fn(Secret) -> _)
            .register(
                ResourceKind::Deployment,
                ResourceObject::Deployment as fn(Deployment) -> _,
            )
            .register(
                ResourceKind::ClusterRole,
                ResourceObject::ClusterRole as fn(ClusterRole) -> _,
            )
            .register(
                ResourceKind::ClusterRoleBinding,
                ResourceObject::ClusterRoleBinding as fn(ClusterRoleBinding) -> _,
            )
            .register(
                ResourceKind::CustomResourceDefinition,
                ResourceObject::CustomResourceDefinition as fn(CustomResourceDefinition) -> _,
            )
            .register(
                ResourceKind::Klusterlet,
                ResourceObject::Klusterlet as fn(Klusterlet) -> _,
            )
            .build()
    }

    /// Start an empty registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Whether `(api_version, kind)` decodes to a typed variant
    pub fn recognizes(&self, api_version: &str, kind: &str) -> bool {
        self.decoders
            .contains_key(&(api_version.to_string(), kind.to_string()))
    }

    /// Decode a document using its own `apiVersion`/`kind`.
    ///
    /// Well-formed documents of unregistered kinds come back as
    /// [`ResourceObject::Unrecognized`].
    pub fn decode(&self, doc: serde_json::Value) -> Result<ResourceObject, DecodeError> {
        let api_version = doc
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or(DecodeError::MissingTypeField("apiVersion"))?
            .to_string();
        let kind = doc
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or(DecodeError::MissingTypeField("kind"))?
            .to_string();

        match self.decoders.get(&(api_version.clone(), kind.clone())) {
            Some(decode) => decode(doc).map_err(|source| DecodeError::Invalid { kind, source }),
            None => serde_json::from_value::<DynamicObject>(doc)
                .map(ResourceObject::Unrecognized)
                .map_err(|source| DecodeError::Invalid {
                    kind: format!("{}/{}", api_version, kind),
                    source,
                }),
        }
    }
}

/// Builder for a [`KindRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    decoders: HashMap<(String, String), Decoder>,
}

impl RegistryBuilder {
    /// Decode documents of `kind` as `K`, then wrap them with `wrap`
    pub fn register<K>(mut self, kind: ResourceKind, wrap: fn(K) -> ResourceObject) -> Self
    where
        K: DeserializeOwned + 'static,
    {
        self.decoders.insert(
            (kind.api_version(), kind.kind().to_string()),
            Box::new(move |doc| serde_json::from_value::<K>(doc).map(wrap)),
        );
        self
    }

    /// Finish the registry
    pub fn build(self) -> KindRegistry {
        KindRegistry {
            decoders: self.decoders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_registry_covers_every_kind() {
        let registry = KindRegistry::standard();
        for kind in ResourceKind::ALL {
            assert!(
                registry.recognizes(&kind.api_version(), kind.kind()),
                "{kind} missing"
            );
        }
    }

    #[test]
    fn decodes_by_embedded_discriminator() {
        let registry = KindRegistry::standard();
        let obj = registry
            .decode(json!({
                "apiVersion": "v1",
                "kind": "ServiceAccount",
                "metadata": {"name": "klusterlet", "namespace": "open-cluster-management"}
            }))
            .unwrap();
        assert_eq!(obj.kind(), Some(ResourceKind::ServiceAccount));
        assert_eq!(obj.name(), "klusterlet");
    }

    #[test]
    fn unknown_kind_is_unrecognized_not_an_error() {
        let registry = KindRegistry::standard();
        let obj = registry
            .decode(json!({
                "apiVersion": "example.io/v1",
                "kind": "Widget",
                "metadata": {"name": "w"}
            }))
            .unwrap();
        assert!(matches!(obj, ResourceObject::Unrecognized(_)));
        assert_eq!(obj.describe(), "example.io/v1/Widget w");
    }

    #[test]
    fn known_kind_under_wrong_group_is_unrecognized() {
        let registry = KindRegistry::standard();
        let obj = registry
            .decode(json!({
                "apiVersion": "extensions/v1beta1",
                "kind": "Deployment",
                "metadata": {"name": "old"}
            }))
            .unwrap();
        assert!(matches!(obj, ResourceObject::Unrecognized(_)));
    }

    #[test]
    fn missing_kind_is_an_error() {
        let registry = KindRegistry::standard();
        let err = registry
            .decode(json!({"apiVersion": "v1", "metadata": {"name": "x"}}))
            .unwrap_err();
        assert!(matches!(err, DecodeError::MissingTypeField("kind")));
    }

    #[test]
    fn malformed_typed_document_is_an_error() {
        let registry = KindRegistry::standard();
        let err = registry
            .decode(json!({
                "apiVersion": "v1",
                "kind": "Secret",
                "metadata": {"name": "s"},
                "data": {"k": 42}
            }))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { .. }));
    }

    #[test]
    fn empty_registry_recognizes_nothing() {
        let registry = KindRegistry::builder().build();
        let obj = registry
            .decode(json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "n"}}))
            .unwrap();
        assert!(matches!(obj, ResourceObject::Unrecognized(_)));
    }
}
