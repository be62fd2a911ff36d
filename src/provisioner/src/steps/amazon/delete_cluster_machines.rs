//! Terminates every machine tagged with the cluster id.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::clouds::CLUSTER_ID_TAG;
use cluster::Result;

use crate::config::Config;
use crate::workflow::Step;

use super::GetEc2Fn;

pub const STEP_NAME: &str = "aws_delete_cluster_machines";

pub struct DeleteClusterMachinesStep {
    get_ec2: GetEc2Fn,
}

impl DeleteClusterMachinesStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        DeleteClusterMachinesStep { get_ec2 }
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
        tracing::info!(
            "[{}] deleting machines of cluster {}",
            STEP_NAME,
            config.cluster_name
        );

        let ec2 = (self.get_ec2)(&config.aws)?;
        let instances = ec2
            .describe_instances_by_tag(CLUSTER_ID_TAG, &config.cluster_id)
            .await?;

        if instances.is_empty() {
            tracing::info!(
                "[{}] no machines in cluster {}",
                STEP_NAME,
                config.cluster_name
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
        "bulk terminates all machines tagged with the cluster id"
    }
}
