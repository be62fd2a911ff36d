//! Terminates every droplet carrying the cluster tag.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::{cluster_tag, GetDropletFn};

pub const STEP_NAME: &str = "digitalocean_delete_cluster_machines";

pub struct DeleteClusterMachinesStep {
    get_service: GetDropletFn,
}

impl DeleteClusterMachinesStep {
    pub fn new(get_service: GetDropletFn) -> Self {
        DeleteClusterMachinesStep { get_service }
    }
}

#[async_trait]
impl Step for DeleteClusterMachinesStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let service = (self.get_service)(&config.digitalocean)?;
        let tag = cluster_tag(&config.cluster_id);

        match service.delete_by_tag(&tag).await {
            Ok(()) | Err(Error::NotFound(_)) => {
                let _ = writeln!(out, "cluster {} machines deleted", config.cluster_id);
                tracing::info!(
                    "[{}] deleted machines of cluster {}",
                    STEP_NAME,
                    config.cluster_id
                );
                Ok(())
            }
            Err(err) => Err(Error::provider(
                "digitalocean",
                format!("{}: {}", STEP_NAME, err),
            )),
        }
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "bulk deletes all droplets tagged with the cluster id"
    }
}
