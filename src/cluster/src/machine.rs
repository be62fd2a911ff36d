//! Machine record and the deterministic naming rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clouds::CloudProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Master,
    Node,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Node => f.write_str("node"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Planned,
    Building,
    Provisioning,
    Error,
    Active,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub role: Role,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub provider: CloudProvider,
    pub region: String,
    pub size: String,
    #[serde(rename = "publicIp")]
    pub public_ip: String,
    #[serde(rename = "privateIp")]
    pub private_ip: String,
    pub state: MachineState,
}

impl Machine {
    /// An active machine always carries a private address.
    pub fn is_ready(&self) -> bool {
        self.state == MachineState::Active && !self.private_ip.is_empty()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Machine {
            id: String::new(),
            name: String::new(),
            role: Role::Node,
            created_at: Utc::now(),
            provider: CloudProvider::default(),
            region: String::new(),
            size: String::new(),
            public_ip: String::new(),
            private_ip: String::new(),
            state: MachineState::Planned,
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<id: {}, name: {}, state: {:?}, size: {}, provider: {}, region: {}, public ip: {}, private ip: {}>",
            self.id, self.name, self.state, self.size, self.provider, self.region,
            self.public_ip, self.private_ip
        )
    }
}

/// Builds the deterministic machine name from the lowercased cluster name,
/// the role and the task id prefix. Equal inputs yield equal names, which
/// is what makes create steps idempotent across reruns.
pub fn make_name(cluster_name: &str, task_id: &str, is_master: bool) -> String {
    let role = if is_master { "master" } else { "node" };
    let prefix_len = task_id.len().min(4);
    format!(
        "{}-{}-{}",
        cluster_name.to_lowercase(),
        role,
        &task_id[..prefix_len]
    )
}
