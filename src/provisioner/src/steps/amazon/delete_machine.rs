//! Terminates one machine by name tag. Idempotent on not-found.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::Result;

use crate::config::Config;
use crate::workflow::Step;

use super::GetEc2Fn;

pub const STEP_NAME: &str = "aws_delete_machine";

pub struct DeleteMachineStep {
    get_ec2: GetEc2Fn,
}

impl DeleteMachineStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        DeleteMachineStep { get_ec2 }
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
        let ec2 = (self.get_ec2)(&config.aws)?;
        let instances = ec2
            .describe_instances_by_tag("Name", &config.node.name)
            .await?;

        if instances.is_empty() {
            tracing::info!(
                "[{}] machine {} not found, nothing to terminate",
                STEP_NAME,
                config.node.name
            );
            return Ok(());
        }

        let ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
        let terminated = ec2.terminate_instances(&ids).await?;
        let _ = writeln!(out, "terminated instances {}", terminated.join(", "));
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "terminates one machine, tolerating machines that are already gone"
    }
}
