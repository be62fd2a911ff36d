//! Persisted cluster record and the service that stores it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::clouds::CloudProvider;
use crate::error::{Error, Result};
use crate::machine::Machine;
use crate::storage::Storage;

pub const KUBES_PREFIX: &str = "kubes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KubeState {
    Prepare,
    Provisioning,
    Operational,
    Failed,
}

impl fmt::Display for KubeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            KubeState::Prepare => "prepare",
            KubeState::Provisioning => "provisioning",
            KubeState::Operational => "operational",
            KubeState::Failed => "failed",
        };
        f.write_str(state)
    }
}

/// Auth bundle generated at bootstrap time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Auth {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "caCert")]
    pub ca_cert: String,
    #[serde(default, rename = "caKey")]
    pub ca_key: String,
    #[serde(default, rename = "adminCert")]
    pub admin_cert: String,
    #[serde(default, rename = "adminKey")]
    pub admin_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Networking {
    #[serde(default)]
    pub manager: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, rename = "type")]
    pub network_type: String,
    #[serde(default, rename = "CIDR")]
    pub cidr: String,
}

/// The cluster record. Identified by the 8-char prefix of the cluster
/// task id; rewritten wholesale by the state monitor on every update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kube {
    pub id: String,
    pub state: KubeState,
    pub name: String,
    pub provider: CloudProvider,
    #[serde(default, rename = "accountName")]
    pub account_name: String,
    #[serde(default, rename = "rbacEnabled")]
    pub rbac_enabled: bool,
    #[serde(default, rename = "servicesCIDR")]
    pub services_cidr: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default, rename = "operatingSystem")]
    pub operating_system: String,
    #[serde(default, rename = "operatingSystemVersion")]
    pub operating_system_version: String,
    #[serde(default, rename = "K8SVersion")]
    pub k8s_version: String,
    #[serde(default, rename = "dockerVersion")]
    pub docker_version: String,
    #[serde(default, rename = "helmVersion")]
    pub helm_version: String,
    #[serde(default, rename = "sshUser")]
    pub ssh_user: String,
    #[serde(default, rename = "sshPublicKey")]
    pub ssh_public_key: String,
    #[serde(default, rename = "bootstrapPublicKey")]
    pub bootstrap_public_key: String,
    #[serde(default, rename = "bootstrapPrivateKey")]
    pub bootstrap_private_key: String,
    #[serde(default, rename = "profileId")]
    pub profile_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub networking: Networking,
    #[serde(default, rename = "cloudSpec")]
    pub cloud_spec: HashMap<String, String>,
    #[serde(default)]
    pub subnets: HashMap<String, String>,
    #[serde(default)]
    pub masters: HashMap<String, Machine>,
    #[serde(default)]
    pub nodes: HashMap<String, Machine>,
    /// Task id index grouped by phase, used by the restart flow.
    #[serde(default)]
    pub tasks: HashMap<String, Vec<String>>,
}

/// Store contract the monitor and the provisioner depend on.
#[async_trait]
pub trait ClusterService: Send + Sync {
    async fn create(&self, kube: &Kube) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Kube>;
}

/// JSON-over-storage implementation of [`ClusterService`].
pub struct KubeService {
    prefix: String,
    repository: Arc<dyn Storage>,
}

impl KubeService {
    pub fn new(repository: Arc<dyn Storage>) -> Self {
        KubeService {
            prefix: KUBES_PREFIX.to_string(),
            repository,
        }
    }
}

#[async_trait]
impl ClusterService for KubeService {
    async fn create(&self, kube: &Kube) -> Result<()> {
        let data = serde_json::to_vec(kube)?;
        self.repository.put(&self.prefix, &kube.id, data).await
    }

    async fn get(&self, id: &str) -> Result<Kube> {
        let data = self
            .repository
            .get(&self.prefix, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("kube {}", id)))?;
        Ok(serde_json::from_slice(&data)?)
    }
}

impl Default for Kube {
    fn default() -> Self {
        Kube {
            id: String::new(),
            state: KubeState::Prepare,
            name: String::new(),
            provider: CloudProvider::default(),
            account_name: String::new(),
            rbac_enabled: false,
            services_cidr: String::new(),
            region: String::new(),
            zone: String::new(),
            arch: String::new(),
            operating_system: String::new(),
            operating_system_version: String::new(),
            k8s_version: String::new(),
            docker_version: String::new(),
            helm_version: String::new(),
            ssh_user: String::new(),
            ssh_public_key: String::new(),
            bootstrap_public_key: String::new(),
            bootstrap_private_key: String::new(),
            profile_id: String::new(),
            user: String::new(),
            password: String::new(),
            auth: Auth::default(),
            networking: Networking::default(),
            cloud_spec: HashMap::new(),
            subnets: HashMap::new(),
            masters: HashMap::new(),
            nodes: HashMap::new(),
            tasks: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn kube_service_round_trips() {
        let service = KubeService::new(Arc::new(MemoryStorage::new()));
        let kube = Kube {
            id: "abcd1234".to_string(),
            name: "prod".to_string(),
            state: KubeState::Provisioning,
            ..Kube::default()
        };

        service.create(&kube).await.unwrap();
        let loaded = service.get("abcd1234").await.unwrap();
        assert_eq!(loaded.name, "prod");
        assert_eq!(loaded.state, KubeState::Provisioning);
    }

    #[tokio::test]
    async fn missing_kube_is_not_found() {
        let service = KubeService::new(Arc::new(MemoryStorage::new()));
        let err = service.get("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
