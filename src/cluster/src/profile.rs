//! Cluster profile submitted by the operator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::clouds::CloudProvider;

/// Per machine profile. Free-form key/value pairs interpreted by the
/// provider specific create step ("size", "image", "instance_type", ...).
pub type NodeProfile = HashMap<String, String>;

/// Well known node profile keys.
pub const PROFILE_SIZE: &str = "size";
pub const PROFILE_IMAGE: &str = "image";
pub const PROFILE_INSTANCE_TYPE: &str = "instance_type";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub id: String,
    pub provider: CloudProvider,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default, rename = "operatingSystem")]
    pub operating_system: String,
    #[serde(default, rename = "ubuntuVersion")]
    pub ubuntu_version: String,
    #[serde(default, rename = "K8SVersion")]
    pub k8s_version: String,
    #[serde(default, rename = "dockerVersion")]
    pub docker_version: String,
    #[serde(default, rename = "helmVersion")]
    pub helm_version: String,
    #[serde(default, rename = "flannelVersion")]
    pub flannel_version: String,
    #[serde(default, rename = "networkType")]
    pub network_type: String,
    #[serde(default, rename = "CIDR")]
    pub cidr: String,
    #[serde(default, rename = "K8SServicesCIDR")]
    pub k8s_services_cidr: String,
    #[serde(default, rename = "rbacEnabled")]
    pub rbac_enabled: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, rename = "cloudSpecificSettings")]
    pub cloud_specific_settings: HashMap<String, String>,
    #[serde(default, rename = "masterProfiles")]
    pub master_profiles: Vec<NodeProfile>,
    #[serde(default, rename = "nodesProfiles")]
    pub nodes_profiles: Vec<NodeProfile>,
}

impl Profile {
    /// Total number of machines the profile asks for.
    pub fn machine_count(&self) -> usize {
        self.master_profiles.len() + self.nodes_profiles.len()
    }
}
