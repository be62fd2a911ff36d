//! Shared mutable state carried through a cluster build.
//!
//! One `Config` is created per cluster build; every task runs against a
//! clone of it. Clones share the master/node maps and the monitor channel
//! senders, so concurrent tasks publish machine and state transitions to a
//! single monitor reader while mutating disjoint per-task fields.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;

use cluster::profile::{PROFILE_IMAGE, PROFILE_INSTANCE_TYPE, PROFILE_SIZE};
use cluster::{clouds, CloudProvider, Error, KubeState, Machine, NodeProfile, Profile, Result};

use crate::runner::Runner;

/// Buffer of the monitor channels. Small on purpose, the monitor is the
/// single reader and applies updates in receive order.
const CHANNEL_BUFFER: usize = 64;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigitalOceanConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub image: String,
    /// Fingerprint of the registered bootstrap key, filled by the
    /// register-key step and referenced by droplet creation.
    #[serde(default)]
    pub key_fingerprint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub vpc_cidr: String,
    #[serde(default)]
    pub vpc_id: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub subnets: HashMap<String, String>,
    #[serde(default)]
    pub keypair_name: String,
    #[serde(default)]
    pub masters_security_group_id: String,
    #[serde(default)]
    pub nodes_security_group_id: String,
    #[serde(default)]
    pub route_table_id: String,
    #[serde(default)]
    pub internet_gateway_id: String,
    #[serde(default)]
    pub masters_instance_profile: String,
    #[serde(default)]
    pub nodes_instance_profile: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub instance_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GceConfig {
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub image_family: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub bootstrap_public_key: String,
    #[serde(default)]
    pub bootstrap_private_key: String,
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            user: clouds::OS_USER.to_string(),
            port: "22".to_string(),
            public_key: String::new(),
            bootstrap_public_key: String::new(),
            bootstrap_private_key: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CertificatesConfig {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub parent_cert: String,
    #[serde(default)]
    pub parent_key: String,
    #[serde(default)]
    pub ca_cert: String,
    #[serde(default)]
    pub ca_key: String,
    #[serde(default)]
    pub admin_cert: String,
    #[serde(default)]
    pub admin_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlannelConfig {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub network_type: String,
    #[serde(default)]
    pub etcd_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostStartConfig {
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for PostStartConfig {
    fn default() -> Self {
        PostStartConfig {
            port: "443".to_string(),
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterCheckConfig {
    #[serde(default)]
    pub machine_count: usize,
    #[serde(default)]
    pub timeout_secs: u64,
}

/// Receiving halves of the monitor channels. Taken exactly once by the
/// state monitor; a second take yields `None`.
pub struct MonitorReceivers {
    pub node_rx: mpsc::Receiver<Machine>,
    pub state_rx: mpsc::Receiver<KubeState>,
    pub config_rx: mpsc::Receiver<Box<Config>>,
}

/// The channel bundle owned by a config. Clones share both the senders and
/// the receiver slot.
#[derive(Clone)]
pub struct ConfigChannels {
    node_tx: mpsc::Sender<Machine>,
    state_tx: mpsc::Sender<KubeState>,
    config_tx: mpsc::Sender<Box<Config>>,
    receivers: Arc<Mutex<Option<MonitorReceivers>>>,
}

impl ConfigChannels {
    pub fn new() -> Self {
        let (node_tx, node_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (state_tx, state_rx) = mpsc::channel(CHANNEL_BUFFER);
        let (config_tx, config_rx) = mpsc::channel(CHANNEL_BUFFER);
        ConfigChannels {
            node_tx,
            state_tx,
            config_tx,
            receivers: Arc::new(Mutex::new(Some(MonitorReceivers {
                node_rx,
                state_rx,
                config_rx,
            }))),
        }
    }
}

impl Default for ConfigChannels {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub provider: CloudProvider,
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub cloud_account_name: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub is_master: bool,
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub k8s_version: String,
    #[serde(default)]
    pub docker_version: String,
    #[serde(default)]
    pub helm_version: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub operating_system_version: String,
    #[serde(default)]
    pub rbac_enabled: bool,
    #[serde(default)]
    pub services_cidr: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,

    #[serde(default)]
    pub digitalocean: DigitalOceanConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub gce: GceConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub certificates: CertificatesConfig,
    #[serde(default)]
    pub flannel: FlannelConfig,
    #[serde(default)]
    pub post_start: PostStartConfig,
    #[serde(default)]
    pub cluster_check: ClusterCheckConfig,

    /// Machine the current task is building. Filled by the create step.
    #[serde(default)]
    pub node: Machine,

    #[serde(skip, default = "shared_machine_map")]
    masters: Arc<RwLock<HashMap<String, Machine>>>,
    #[serde(skip, default = "shared_machine_map")]
    nodes: Arc<RwLock<HashMap<String, Machine>>>,

    #[serde(skip)]
    chans: Option<ConfigChannels>,
    #[serde(skip)]
    pub runner: Option<Arc<dyn Runner>>,
}

fn shared_machine_map() -> Arc<RwLock<HashMap<String, Machine>>> {
    Arc::new(RwLock::new(HashMap::new()))
}

impl Default for Config {
    fn default() -> Self {
        Config {
            provider: CloudProvider::default(),
            cluster_id: String::new(),
            cluster_name: String::new(),
            cloud_account_name: String::new(),
            task_id: String::new(),
            is_master: false,
            dry_run: false,
            k8s_version: String::new(),
            docker_version: String::new(),
            helm_version: String::new(),
            arch: String::new(),
            operating_system: String::new(),
            operating_system_version: String::new(),
            rbac_enabled: false,
            services_cidr: String::new(),
            region: String::new(),
            zone: String::new(),
            digitalocean: DigitalOceanConfig::default(),
            aws: AwsConfig::default(),
            gce: GceConfig::default(),
            ssh: SshConfig::default(),
            certificates: CertificatesConfig::default(),
            flannel: FlannelConfig::default(),
            post_start: PostStartConfig::default(),
            cluster_check: ClusterCheckConfig::default(),
            node: Machine::default(),
            masters: shared_machine_map(),
            nodes: shared_machine_map(),
            chans: None,
            runner: None,
        }
    }
}

impl Config {
    /// Build the config for a fresh cluster build from the submitted profile.
    pub fn new(cluster_name: &str, cloud_account_name: &str, profile: &Profile) -> Config {
        let mut ssh = SshConfig::default();
        if !profile.user.is_empty() {
            ssh.user = profile.user.clone();
        }

        Config {
            provider: profile.provider,
            cluster_id: String::new(),
            cluster_name: cluster_name.to_string(),
            cloud_account_name: cloud_account_name.to_string(),
            task_id: String::new(),
            is_master: false,
            dry_run: false,
            k8s_version: profile.k8s_version.clone(),
            docker_version: profile.docker_version.clone(),
            helm_version: profile.helm_version.clone(),
            arch: profile.arch.clone(),
            operating_system: profile.operating_system.clone(),
            operating_system_version: profile.ubuntu_version.clone(),
            rbac_enabled: profile.rbac_enabled,
            services_cidr: profile.k8s_services_cidr.clone(),
            region: profile.region.clone(),
            zone: profile.zone.clone(),
            digitalocean: DigitalOceanConfig {
                region: profile.region.clone(),
                ..DigitalOceanConfig::default()
            },
            aws: AwsConfig {
                region: profile.region.clone(),
                availability_zone: profile.zone.clone(),
                ..AwsConfig::default()
            },
            gce: GceConfig {
                availability_zone: profile.zone.clone(),
                ..GceConfig::default()
            },
            ssh,
            certificates: CertificatesConfig {
                username: profile.user.clone(),
                password: profile.password.clone(),
                ..CertificatesConfig::default()
            },
            flannel: FlannelConfig {
                version: profile.flannel_version.clone(),
                network: profile.cidr.clone(),
                network_type: profile.network_type.clone(),
                etcd_host: String::new(),
            },
            post_start: PostStartConfig::default(),
            cluster_check: ClusterCheckConfig {
                machine_count: profile.machine_count(),
                timeout_secs: 600,
            },
            node: Machine::default(),
            masters: shared_machine_map(),
            nodes: shared_machine_map(),
            chans: Some(ConfigChannels::new()),
            runner: None,
        }
    }

    /// Copy cloud account credentials into the provider specific section.
    pub fn set_credentials(&mut self, credentials: &HashMap<String, String>) -> Result<()> {
        match self.provider {
            CloudProvider::DigitalOcean => {
                let token = credentials
                    .get("accessToken")
                    .filter(|t| !t.is_empty())
                    .ok_or(Error::InvalidCredentials)?;
                self.digitalocean.access_token = token.clone();
            }
            CloudProvider::Aws => {
                let key = credentials
                    .get("access_key_id")
                    .filter(|v| !v.is_empty())
                    .ok_or(Error::InvalidCredentials)?;
                let secret = credentials
                    .get("secret_access_key")
                    .filter(|v| !v.is_empty())
                    .ok_or(Error::InvalidCredentials)?;
                self.aws.access_key_id = key.clone();
                self.aws.secret_access_key = secret.clone();
            }
            CloudProvider::Gce => {
                let email = credentials
                    .get("client_email")
                    .filter(|v| !v.is_empty())
                    .ok_or(Error::InvalidCredentials)?;
                let private_key = credentials
                    .get("private_key")
                    .filter(|v| !v.is_empty())
                    .ok_or(Error::InvalidCredentials)?;
                self.gce.client_email = email.clone();
                self.gce.private_key = private_key.clone();
                if let Some(uri) = credentials.get("token_uri") {
                    self.gce.token_uri = uri.clone();
                }
                if let Some(project) = credentials.get("project_id") {
                    self.gce.project_id = project.clone();
                }
            }
            other => {
                return Err(Error::InvalidArguments(format!(
                    "no credential mapping for provider {}",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Copy provider specific fields from a per machine profile.
    pub fn fill_node_profile(&mut self, profile: &NodeProfile) {
        match self.provider {
            CloudProvider::DigitalOcean => {
                if let Some(size) = profile.get(PROFILE_SIZE) {
                    self.digitalocean.size = size.clone();
                }
                if let Some(image) = profile.get(PROFILE_IMAGE) {
                    self.digitalocean.image = image.clone();
                }
            }
            CloudProvider::Aws => {
                if let Some(instance_type) = profile.get(PROFILE_INSTANCE_TYPE) {
                    self.aws.instance_type = instance_type.clone();
                }
                if let Some(image) = profile.get(PROFILE_IMAGE) {
                    self.aws.image_id = image.clone();
                }
            }
            CloudProvider::Gce => {
                if let Some(size) = profile.get(PROFILE_SIZE) {
                    self.gce.size = size.clone();
                }
                if let Some(image) = profile.get(PROFILE_IMAGE) {
                    self.gce.image_family = image.clone();
                }
            }
            _ => {}
        }
    }

    pub fn add_master(&self, machine: &Machine) {
        if let Ok(mut masters) = self.masters.write() {
            masters.insert(machine.name.clone(), machine.clone());
        }
    }

    pub fn add_node(&self, machine: &Machine) {
        if let Ok(mut nodes) = self.nodes.write() {
            nodes.insert(machine.name.clone(), machine.clone());
        }
    }

    /// A master usable for cluster wide work. Ready masters win; any known
    /// master is returned otherwise.
    pub fn get_master(&self) -> Option<Machine> {
        let masters = self.masters.read().ok()?;
        masters
            .values()
            .find(|m| m.is_ready())
            .or_else(|| masters.values().next())
            .cloned()
    }

    pub fn masters_snapshot(&self) -> HashMap<String, Machine> {
        self.masters.read().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn nodes_snapshot(&self) -> HashMap<String, Machine> {
        self.nodes.read().map(|m| m.clone()).unwrap_or_default()
    }

    /// Publish a machine transition to the monitor. A build without an
    /// attached monitor drops the update.
    pub async fn push_node(&self, machine: Machine) {
        if let Some(chans) = &self.chans {
            let _ = chans.node_tx.send(machine).await;
        }
    }

    /// Publish a cluster state transition to the monitor.
    pub async fn push_state(&self, state: KubeState) {
        if let Some(chans) = &self.chans {
            let _ = chans.state_tx.send(state).await;
        }
    }

    /// Hand the mutated config back to the monitor. Used by the
    /// pre-provision phase so cloud specific settings end up on the record.
    pub async fn push_config(&self) {
        if let Some(chans) = &self.chans {
            let _ = chans.config_tx.send(Box::new(self.clone())).await;
        }
    }

    /// Take the receiving halves. The single monitor reader calls this
    /// exactly once per channel set.
    pub fn take_receivers(&self) -> Option<MonitorReceivers> {
        self.chans
            .as_ref()
            .and_then(|chans| chans.receivers.lock().ok()?.take())
    }

    /// Attach a live channel set. Deserialized configs come back without
    /// one and are reconnected before reuse.
    pub fn attach_channels(&mut self, chans: ConfigChannels) {
        self.chans = Some(chans);
    }

    pub fn channels(&self) -> Option<ConfigChannels> {
        self.chans.clone()
    }
}
