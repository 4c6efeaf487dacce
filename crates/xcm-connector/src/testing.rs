//! In-memory stand-ins for the remote APIs used by unit and scenario tests

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};
use kube::api::ObjectMeta;

use crate::credential::{BootstrapCredential, CredentialStore};
use crate::crd::{
    ClusterClaim, ClusterClaimSpec, ClusterCondition, ManagedCluster, ManagedClusterStatus,
    CONDITION_AVAILABLE, CONDITION_CONNECTED, STATUS_TRUE,
};
use crate::hub::{ClaimClient, HubClient, HubConnector};
use crate::reconcile::ResourceClient;
use crate::resource::{ObjectKey, ResourceKind, ResourceObject};
use crate::{Error, Result};

/// Build the error kube returns for a failed API call with `code`
pub fn api_error(code: u16) -> kube::Error {
    let reason = match code {
        404 => "NotFound",
        409 => "AlreadyExists",
        403 => "Forbidden",
        _ => "InternalError",
    };
    kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("fake api error {code}"),
        reason: reason.to_string(),
        code,
    })
}

/// A recorded write against a [`FakeCluster`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Write {
    Create(ObjectKey),
    Update(ObjectKey),
}

impl Write {
    pub fn key(&self) -> &ObjectKey {
        match self {
            Write::Create(key) | Write::Update(key) => key,
        }
    }
}

#[derive(Default)]
struct ClusterState {
    objects: HashMap<ObjectKey, ResourceObject>,
    claims: BTreeMap<String, ClusterClaim>,
    writes: Vec<Write>,
    claim_writes: usize,
    revision: u64,
}

/// A single cluster API: typed objects plus ClusterClaims
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
    enforce_namespaces: bool,
    require_claim_crd: bool,
    load_balancer_host: Option<String>,
    ready_deployments: bool,
    claim_failures: HashMap<String, u16>,
}

const CLAIM_CRD: &str = "clusterclaims.cluster.open-cluster-management.io";

fn meta_mut(object: &mut ResourceObject) -> &mut ObjectMeta {
    match object {
        ResourceObject::Namespace(o) => &mut o.metadata,
        ResourceObject::Service(o) => &mut o.metadata,
        ResourceObject::ServiceAccount(o) => &mut o.metadata,
        ResourceObject::Secret(o) => &mut o.metadata,
        ResourceObject::Deployment(o) => &mut o.metadata,
        ResourceObject::ClusterRole(o) => &mut o.metadata,
        ResourceObject::ClusterRoleBinding(o) => &mut o.metadata,
        ResourceObject::CustomResourceDefinition(o) => &mut o.metadata,
        ResourceObject::Klusterlet(o) => &mut o.metadata,
        ResourceObject::Unrecognized(o) => &mut o.metadata,
    }
}

impl FakeCluster {
    /// Namespaced creates fail with 404 until their namespace exists
    pub fn enforce_namespaces(mut self) -> Self {
        self.enforce_namespaces = true;
        self
    }

    /// Claim writes fail with 404 until the ClusterClaim CRD exists
    pub fn require_claim_crd(mut self) -> Self {
        self.require_claim_crd = true;
        self
    }

    /// Services get `host` as their load balancer address on create
    pub fn with_load_balancer(mut self, host: &str) -> Self {
        self.load_balancer_host = Some(host.to_string());
        self
    }

    /// Deployments become fully available as soon as they are written
    pub fn with_ready_deployments(mut self) -> Self {
        self.ready_deployments = true;
        self
    }

    /// Creating the claim `name` fails with `code`
    pub fn fail_claim(mut self, name: &str, code: u16) -> Self {
        self.claim_failures.insert(name.to_string(), code);
        self
    }

    /// Seed an object without recording a write
    pub fn insert(&self, object: ResourceObject) {
        if let Some(key) = object.key() {
            let mut state = self.state.lock().unwrap();
            state.objects.insert(key, object);
        }
    }

    /// Seed a claim without recording a write
    pub fn insert_claim(&self, name: &str, value: &str) {
        let mut state = self.state.lock().unwrap();
        state.claims.insert(name.to_string(), new_claim(name, value));
    }

    pub fn object(&self, key: &ObjectKey) -> Option<ResourceObject> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Claims as `name -> value`
    pub fn claims(&self) -> BTreeMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .claims
            .iter()
            .map(|(k, v)| (k.clone(), v.spec.value.clone()))
            .collect()
    }

    pub fn claim_writes(&self) -> usize {
        self.state.lock().unwrap().claim_writes
    }

    fn settle(&self, object: &mut ResourceObject) {
        match object {
            ResourceObject::Service(svc) => {
                if let Some(host) = &self.load_balancer_host {
                    svc.status = Some(ServiceStatus {
                        load_balancer: Some(LoadBalancerStatus {
                            ingress: Some(vec![LoadBalancerIngress {
                                hostname: Some(host.clone()),
                                ..Default::default()
                            }]),
                        }),
                        ..Default::default()
                    });
                }
            }
            ResourceObject::Deployment(d) if self.ready_deployments => {
                let replicas = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                d.status = Some(DeploymentStatus {
                    observed_generation: d.metadata.generation,
                    replicas: Some(replicas),
                    updated_replicas: Some(replicas),
                    available_replicas: Some(replicas),
                    ..Default::default()
                });
            }
            _ => {}
        }
    }

    fn store(&self, object: &ResourceObject, create: bool) -> Result<()> {
        let key = object
            .key()
            .ok_or_else(|| Error::internal("fake cluster cannot store unrecognized objects"))?;
        let mut state = self.state.lock().unwrap();

        if create {
            if state.objects.contains_key(&key) {
                return Err(api_error(409).into());
            }
            if self.enforce_namespaces {
                if let Some(ns) = &key.namespace {
                    let ns_key = ObjectKey::new(ResourceKind::Namespace, None, ns);
                    if !state.objects.contains_key(&ns_key) {
                        return Err(api_error(404).into());
                    }
                }
            }
        } else if !state.objects.contains_key(&key) {
            return Err(api_error(404).into());
        }

        let mut stored = object.clone();
        state.revision += 1;
        let meta = meta_mut(&mut stored);
        meta.resource_version = Some(state.revision.to_string());
        meta.generation = Some(meta.generation.unwrap_or_default() + 1);
        self.settle(&mut stored);

        state.objects.insert(key.clone(), stored);
        state.writes.push(if create {
            Write::Create(key)
        } else {
            Write::Update(key)
        });
        Ok(())
    }
}

#[async_trait]
impl ResourceClient for FakeCluster {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ResourceObject>> {
        Ok(self.object(key))
    }

    async fn create(&self, object: &ResourceObject) -> Result<()> {
        self.store(object, true)
    }

    async fn update(&self, object: &ResourceObject) -> Result<()> {
        self.store(object, false)
    }
}

fn new_claim(name: &str, value: &str) -> ClusterClaim {
    ClusterClaim::new(
        name,
        ClusterClaimSpec {
            value: value.to_string(),
        },
    )
}

#[async_trait]
impl ClaimClient for FakeCluster {
    async fn get_claim(&self, name: &str) -> Result<Option<ClusterClaim>> {
        Ok(self.state.lock().unwrap().claims.get(name).cloned())
    }

    async fn create_claim(&self, claim: &ClusterClaim) -> Result<ClusterClaim> {
        let name = claim.metadata.name.clone().unwrap_or_default();
        if let Some(code) = self.claim_failures.get(&name) {
            return Err(api_error(*code).into());
        }
        let mut state = self.state.lock().unwrap();
        if self.require_claim_crd {
            let crd = ObjectKey::new(ResourceKind::CustomResourceDefinition, None, CLAIM_CRD);
            if !state.objects.contains_key(&crd) {
                return Err(api_error(404).into());
            }
        }
        if state.claims.contains_key(&name) {
            return Err(api_error(409).into());
        }
        state.claims.insert(name, claim.clone());
        state.claim_writes += 1;
        Ok(claim.clone())
    }
}

#[derive(Default)]
struct HubState {
    clusters: BTreeMap<String, ManagedCluster>,
    available: bool,
    connected: bool,
    connects: usize,
    polls: usize,
    connect_after_polls: Option<usize>,
}

/// The control plane's cluster registry, with agent-reported conditions
/// toggled by the test
#[derive(Clone, Default)]
pub struct FakeHub {
    state: Arc<Mutex<HubState>>,
}

impl FakeHub {
    /// Agent conditions reported on every cluster record
    pub fn set_conditions(&self, available: bool, connected: bool) {
        let mut state = self.state.lock().unwrap();
        state.available = available;
        state.connected = connected;
    }

    /// Both conditions flip to true once the record was read `polls` times
    pub fn connect_after_polls(&self, polls: usize) {
        self.state.lock().unwrap().connect_after_polls = Some(polls);
    }

    pub fn cluster(&self, name: &str) -> Option<ManagedCluster> {
        self.state.lock().unwrap().clusters.get(name).cloned()
    }

    pub fn cluster_names(&self) -> Vec<String> {
        self.state.lock().unwrap().clusters.keys().cloned().collect()
    }

    /// How many times a client was opened with a credential
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }
}

fn condition(type_: &str, value: bool) -> ClusterCondition {
    ClusterCondition {
        type_: type_.to_string(),
        status: if value { STATUS_TRUE } else { "False" }.to_string(),
        reason: String::new(),
        message: String::new(),
        last_transition_time: None,
    }
}

#[async_trait]
impl HubClient for FakeHub {
    async fn get_managed_cluster(&self, name: &str) -> Result<Option<ManagedCluster>> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        if state
            .connect_after_polls
            .is_some_and(|after| state.polls > after)
        {
            state.available = true;
            state.connected = true;
        }
        let (available, connected) = (state.available, state.connected);
        Ok(state.clusters.get(name).cloned().map(|mut cluster| {
            cluster.status = Some(ManagedClusterStatus {
                conditions: vec![
                    condition(CONDITION_AVAILABLE, available),
                    condition(CONDITION_CONNECTED, connected),
                ],
                ..Default::default()
            });
            cluster
        }))
    }

    async fn create_managed_cluster(&self, cluster: &ManagedCluster) -> Result<ManagedCluster> {
        let name = cluster.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        if state.clusters.contains_key(&name) {
            return Err(api_error(409).into());
        }
        state.clusters.insert(name, cluster.clone());
        Ok(cluster.clone())
    }
}

#[async_trait]
impl HubConnector for FakeHub {
    async fn connect(&self, credential: &BootstrapCredential) -> Result<Arc<dyn HubClient>> {
        credential.kubeconfig()?;
        self.state.lock().unwrap().connects += 1;
        Ok(Arc::new(self.clone()))
    }
}

/// Credential store holding raw bytes, like the file it stands in for
#[derive(Default)]
pub struct MemoryStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn with_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes.to_vec())),
        }
    }

    pub fn saved(&self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().clone()
    }
}

impl CredentialStore for MemoryStore {
    fn save_admin_credential(&self, credential: &BootstrapCredential) -> Result<()> {
        *self.bytes.lock().unwrap() = Some(credential.as_bytes().to_vec());
        Ok(())
    }

    fn load_admin_credential(&self) -> Result<BootstrapCredential> {
        match self.bytes.lock().unwrap().as_deref() {
            Some(bytes) => BootstrapCredential::from_bytes(bytes),
            None => Err(Error::credential("no credential has been saved")),
        }
    }
}
