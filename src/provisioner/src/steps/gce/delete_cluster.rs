//! Deletes every machine the cluster build knows about.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::GetComputeFn;

pub const STEP_NAME: &str = "gce_delete_cluster";

pub struct DeleteClusterStep {
    get_compute: GetComputeFn,
}

impl DeleteClusterStep {
    pub fn new(get_compute: GetComputeFn) -> Self {
        DeleteClusterStep { get_compute }
    }
}

#[async_trait]
impl Step for DeleteClusterStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let compute = (self.get_compute)(&config.gce)?;

        let machines = config
            .masters_snapshot()
            .into_values()
            .chain(config.nodes_snapshot().into_values());

        for machine in machines {
            tracing::debug!(
                "[{}] delete machine {} in {}",
                STEP_NAME,
                machine.name,
                machine.region
            );
            match compute.delete_instance(&machine.region, &machine.name).await {
                Ok(()) | Err(Error::NotFound(_)) => {
                    let _ = writeln!(out, "instance {} deleted", machine.name);
                }
                Err(err) => {
                    return Err(Error::provider(
                        "gce",
                        format!("{}: {}: {}", STEP_NAME, machine.name, err),
                    ))
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "deletes every master and node machine of the cluster"
    }
}
