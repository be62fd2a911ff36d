//! Deletes one compute instance. Idempotent on not-found.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::GetComputeFn;

pub const STEP_NAME: &str = "gce_delete_node";

pub struct DeleteNodeStep {
    get_compute: GetComputeFn,
}

impl DeleteNodeStep {
    pub fn new(get_compute: GetComputeFn) -> Self {
        DeleteNodeStep { get_compute }
    }
}

#[async_trait]
impl Step for DeleteNodeStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let compute = (self.get_compute)(&config.gce)?;
        match compute
            .delete_instance(&config.node.region, &config.node.name)
            .await
        {
            Ok(()) | Err(Error::NotFound(_)) => {
                let _ = writeln!(out, "instance {} deleted", config.node.name);
                Ok(())
            }
            Err(err) => Err(Error::provider("gce", format!("{}: {}", STEP_NAME, err))),
        }
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "deletes one compute instance, tolerating machines that are already gone"
    }
}
