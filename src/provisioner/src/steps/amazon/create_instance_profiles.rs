//! Creates the per-role IAM instance profiles.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::Result;

use crate::config::Config;
use crate::workflow::Step;

use super::GetEc2Fn;

pub const STEP_NAME: &str = "aws_create_instance_profiles";

pub struct CreateInstanceProfilesStep {
    get_ec2: GetEc2Fn,
}

impl CreateInstanceProfilesStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        CreateInstanceProfilesStep { get_ec2 }
    }
}

#[async_trait]
impl Step for CreateInstanceProfilesStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.masters_instance_profile.is_empty()
            && !config.aws.nodes_instance_profile.is_empty()
        {
            tracing::info!("[{}] instance profiles already set, skipping", STEP_NAME);
            return Ok(());
        }

        let ec2 = (self.get_ec2)(&config.aws)?;

        if config.aws.masters_instance_profile.is_empty() {
            config.aws.masters_instance_profile = ec2
                .create_instance_profile(&format!("{}-master", config.cluster_name))
                .await?;
        }
        if config.aws.nodes_instance_profile.is_empty() {
            config.aws.nodes_instance_profile = ec2
                .create_instance_profile(&format!("{}-node", config.cluster_name))
                .await?;
        }

        let _ = writeln!(
            out,
            "instance profiles {} / {}",
            config.aws.masters_instance_profile, config.aws.nodes_instance_profile
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "creates IAM instance profiles for masters and nodes"
    }
}
