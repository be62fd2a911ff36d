//! Deletes a single droplet by machine name. Idempotent on not-found.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::{cluster_tag, GetDropletFn};

pub const STEP_NAME: &str = "digitalocean_delete_machine";

pub struct DeleteMachineStep {
    get_service: GetDropletFn,
}

impl DeleteMachineStep {
    pub fn new(get_service: GetDropletFn) -> Self {
        DeleteMachineStep { get_service }
    }
}

#[async_trait]
impl Step for DeleteMachineStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let service = (self.get_service)(&config.digitalocean)?;
        let droplets = service.list_by_tag(&cluster_tag(&config.cluster_id)).await?;

        let Some(droplet) = droplets.iter().find(|d| d.name == config.node.name) else {
            tracing::info!(
                "[{}] droplet {} not found, nothing to delete",
                STEP_NAME,
                config.node.name
            );
            return Ok(());
        };

        match service.delete(droplet.id).await {
            Ok(()) | Err(Error::NotFound(_)) => {
                let _ = writeln!(out, "droplet {} deleted", config.node.name);
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
        "deletes one droplet, tolerating machines that are already gone"
    }
}
