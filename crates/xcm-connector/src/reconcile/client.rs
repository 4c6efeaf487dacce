//! Remote verbs the reconciler depends on

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::PostParams;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use crate::crd::Klusterlet;
use crate::resource::{ObjectKey, ResourceKind, ResourceObject};
use crate::{Error, Result};

/// Get/create/update of [`ResourceObject`]s on one cluster
///
/// Implementations return `Ok(None)` from `get` when the object does not
/// exist and surface every other failure as an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch the current remote state of `key`
    async fn get(&self, key: &ObjectKey) -> Result<Option<ResourceObject>>;

    /// Create `object`; fails if it already exists
    async fn create(&self, object: &ResourceObject) -> Result<()>;

    /// Replace `object`; the carried `resourceVersion` makes the write
    /// conditional on nobody having changed it since it was read
    async fn update(&self, object: &ResourceObject) -> Result<()>;
}

/// [`ResourceClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Client over the cluster behind `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: Option<&str>) -> Result<Api<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        let ns = namespace
            .ok_or_else(|| Error::validation("namespaced object is missing its namespace"))?;
        Ok(Api::namespaced(self.client.clone(), ns))
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    async fn get_namespaced<K>(&self, key: &ObjectKey) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self
            .namespaced::<K>(key.namespace.as_deref())?
            .get_opt(&key.name)
            .await?)
    }

    async fn get_cluster<K>(&self, key: &ObjectKey) -> Result<Option<K>>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        Ok(self.cluster::<K>().get_opt(&key.name).await?)
    }

    async fn write_namespaced<K>(&self, object: &K, replace: bool) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let api = self.namespaced::<K>(object.meta().namespace.as_deref())?;
        if replace {
            api.replace(&object.name_any(), &PostParams::default(), object)
                .await?;
        } else {
            api.create(&PostParams::default(), object).await?;
        }
        Ok(())
    }

    async fn write_cluster<K>(&self, object: &K, replace: bool) -> Result<()>
    where
        K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let api = self.cluster::<K>();
        if replace {
            api.replace(&object.name_any(), &PostParams::default(), object)
                .await?;
        } else {
            api.create(&PostParams::default(), object).await?;
        }
        Ok(())
    }

    async fn write(&self, object: &ResourceObject, replace: bool) -> Result<()> {
        match object {
            ResourceObject::Namespace(o) => self.write_cluster(o, replace).await,
            ResourceObject::Service(o) => self.write_namespaced(o, replace).await,
            ResourceObject::ServiceAccount(o) => self.write_namespaced(o, replace).await,
            ResourceObject::Secret(o) => self.write_namespaced(o, replace).await,
            ResourceObject::Deployment(o) => self.write_namespaced(o, replace).await,
            ResourceObject::ClusterRole(o) => self.write_cluster(o, replace).await,
            ResourceObject::ClusterRoleBinding(o) => self.write_cluster(o, replace).await,
            ResourceObject::CustomResourceDefinition(o) => self.write_cluster(o, replace).await,
            ResourceObject::Klusterlet(o) => self.write_cluster(o, replace).await,
            ResourceObject::Unrecognized(_) => Err(Error::internal_with_context(
                "reconcile",
                format!("refusing to write {}", object.describe()),
            )),
        }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ResourceObject>> {
        Ok(match key.kind {
            ResourceKind::Namespace => self
                .get_cluster::<Namespace>(key)
                .await?
                .map(ResourceObject::Namespace),
            ResourceKind::Service => self
                .get_namespaced::<Service>(key)
                .await?
                .map(ResourceObject::Service),
            ResourceKind::ServiceAccount => self
                .get_namespaced::<ServiceAccount>(key)
                .await?
                .map(ResourceObject::ServiceAccount),
            ResourceKind::Secret => self
                .get_namespaced::<Secret>(key)
                .await?
                .map(ResourceObject::Secret),
            ResourceKind::Deployment => self
                .get_namespaced::<Deployment>(key)
                .await?
                .map(ResourceObject::Deployment),
            ResourceKind::ClusterRole => self
                .get_cluster::<ClusterRole>(key)
                .await?
                .map(ResourceObject::ClusterRole),
            ResourceKind::ClusterRoleBinding => self
                .get_cluster::<ClusterRoleBinding>(key)
                .await?
                .map(ResourceObject::ClusterRoleBinding),
            ResourceKind::CustomResourceDefinition => self
                .get_cluster::<CustomResourceDefinition>(key)
                .await?
                .map(ResourceObject::CustomResourceDefinition),
            ResourceKind::Klusterlet => self
                .get_cluster::<Klusterlet>(key)
                .await?
                .map(ResourceObject::Klusterlet),
        })
    }

    async fn create(&self, object: &ResourceObject) -> Result<()> {
        self.write(object, false).await
    }

    async fn update(&self, object: &ResourceObject) -> Result<()> {
        self.write(object, true).await
    }
}
