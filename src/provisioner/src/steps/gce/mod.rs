//! GCE steps and the narrow compute interface they consume.

pub mod create_instance;
pub mod delete_cluster;
pub mod delete_node;

use async_trait::async_trait;
use std::sync::Arc;

use cluster::{Error, Result};

use crate::config::GceConfig;

#[derive(Debug, Clone, Default)]
pub struct GceInstance {
    pub id: String,
    pub status: String,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
}

impl GceInstance {
    pub fn is_running(&self) -> bool {
        self.status == "RUNNING"
    }
}

#[derive(Debug, Clone, Default)]
pub struct InsertInstanceRequest {
    pub name: String,
    pub machine_type: String,
    pub image_family: String,
    pub ssh_public_key: String,
    pub role: String,
    pub cluster_id: String,
}

/// Compute surface used by the steps; the SDK-backed client is wired by
/// the embedding process, tests install mocks.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn insert_instance(&self, zone: &str, req: &InsertInstanceRequest) -> Result<()>;
    async fn get_instance(&self, zone: &str, name: &str) -> Result<Option<GceInstance>>;
    async fn delete_instance(&self, zone: &str, name: &str) -> Result<()>;
}

pub type GetComputeFn = Arc<dyn Fn(&GceConfig) -> Result<Arc<dyn ComputeApi>> + Send + Sync>;

/// Placeholder factory for processes that never touch GCE.
pub fn unconfigured_compute_fn() -> GetComputeFn {
    Arc::new(|_| {
        Err(Error::InvalidArguments(
            "no compute client wired, supply one via ProviderClients".to_string(),
        ))
    })
}
