//! Creates the master and node security groups.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::GetEc2Fn;

pub const STEP_NAME: &str = "aws_create_security_groups";

const ANYWHERE: &str = "0.0.0.0/0";

pub struct CreateSecurityGroupsStep {
    get_ec2: GetEc2Fn,
}

impl CreateSecurityGroupsStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        CreateSecurityGroupsStep { get_ec2 }
    }
}

#[async_trait]
impl Step for CreateSecurityGroupsStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.masters_security_group_id.is_empty()
            && !config.aws.nodes_security_group_id.is_empty()
        {
            tracing::info!("[{}] security groups already set, skipping", STEP_NAME);
            return Ok(());
        }
        if config.aws.vpc_id.is_empty() {
            return Err(Error::InvalidArguments(
                "aws_create_security_groups needs a vpc id".to_string(),
            ));
        }

        let ec2 = (self.get_ec2)(&config.aws)?;

        if config.aws.masters_security_group_id.is_empty() {
            let group = ec2
                .create_security_group(
                    &config.aws.vpc_id,
                    &format!("{}-masters", config.cluster_name),
                )
                .await?;
            ec2.authorize_ingress(&group, 22, 22, ANYWHERE).await?;
            ec2.authorize_ingress(&group, 443, 443, ANYWHERE).await?;
            ec2.authorize_ingress(&group, 6443, 6443, ANYWHERE).await?;
            config.aws.masters_security_group_id = group;
        }

        if config.aws.nodes_security_group_id.is_empty() {
            let group = ec2
                .create_security_group(
                    &config.aws.vpc_id,
                    &format!("{}-nodes", config.cluster_name),
                )
                .await?;
            ec2.authorize_ingress(&group, 22, 22, ANYWHERE).await?;
            ec2.authorize_ingress(&group, 0, 65535, &config.aws.vpc_cidr)
                .await?;
            config.aws.nodes_security_group_id = group;
        }

        let _ = writeln!(
            out,
            "security groups {} / {}",
            config.aws.masters_security_group_id, config.aws.nodes_security_group_id
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "creates per-role security groups with ssh and api access"
    }

    fn depends(&self) -> Vec<&'static str> {
        vec![super::create_vpc::STEP_NAME]
    }
}
