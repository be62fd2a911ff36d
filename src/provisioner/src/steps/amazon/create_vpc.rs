//! Creates the cluster VPC.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::Result;

use crate::config::Config;
use crate::workflow::Step;

use super::{resource_tags, GetEc2Fn, DEFAULT_VPC_CIDR};

pub const STEP_NAME: &str = "aws_create_vpc";

pub struct CreateVpcStep {
    get_ec2: GetEc2Fn,
}

impl CreateVpcStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        CreateVpcStep { get_ec2 }
    }
}

#[async_trait]
impl Step for CreateVpcStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.vpc_id.is_empty() {
            tracing::info!(
                "[{}] vpc {} already exists, skipping",
                STEP_NAME,
                config.aws.vpc_id
            );
            return Ok(());
        }

        if config.aws.vpc_cidr.is_empty() {
            config.aws.vpc_cidr = DEFAULT_VPC_CIDR.to_string();
        }

        let ec2 = (self.get_ec2)(&config.aws)?;
        let vpc_id = ec2.create_vpc(&config.aws.vpc_cidr).await?;
        ec2.create_tags(
            &vpc_id,
            &resource_tags(config, &format!("{}-vpc", config.cluster_name)),
        )
        .await?;

        config.aws.vpc_id = vpc_id;
        let _ = writeln!(out, "vpc {} created", config.aws.vpc_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "creates the VPC the cluster machines live in"
    }
}
