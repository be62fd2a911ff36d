//! Creates the route table, the default route and subnet associations.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::{resource_tags, GetEc2Fn};

pub const STEP_NAME: &str = "aws_create_route_table";

pub struct CreateRouteTableStep {
    get_ec2: GetEc2Fn,
}

impl CreateRouteTableStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        CreateRouteTableStep { get_ec2 }
    }
}

#[async_trait]
impl Step for CreateRouteTableStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.route_table_id.is_empty() {
            tracing::info!(
                "[{}] route table {} already set, skipping",
                STEP_NAME,
                config.aws.route_table_id
            );
            return Ok(());
        }
        if config.aws.vpc_id.is_empty() || config.aws.internet_gateway_id.is_empty() {
            return Err(Error::InvalidArguments(
                "aws_create_route_table needs a vpc and an internet gateway".to_string(),
            ));
        }

        let ec2 = (self.get_ec2)(&config.aws)?;
        let route_table_id = ec2.create_route_table(&config.aws.vpc_id).await?;
        ec2.create_default_route(&route_table_id, &config.aws.internet_gateway_id)
            .await?;
        for subnet_id in config.aws.subnets.values() {
            ec2.associate_route_table(&route_table_id, subnet_id).await?;
        }
        ec2.create_tags(
            &route_table_id,
            &resource_tags(config, &format!("{}-rt", config.cluster_name)),
        )
        .await?;

        config.aws.route_table_id = route_table_id;
        let _ = writeln!(out, "route table {} wired", config.aws.route_table_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "routes subnet traffic through the internet gateway"
    }

    fn depends(&self) -> Vec<&'static str> {
        vec![
            super::create_subnets::STEP_NAME,
            super::create_internet_gateway::STEP_NAME,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::MockEc2;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn associates_every_subnet() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = CreateRouteTableStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.aws.vpc_id = "vpc-1".to_string();
        config.aws.internet_gateway_id = "igw-1".to_string();
        config
            .aws
            .subnets
            .insert("us-east-1a".to_string(), "subnet-a".to_string());
        config
            .aws
            .subnets
            .insert("us-east-1b".to_string(), "subnet-b".to_string());

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(config.aws.route_table_id, "rtb-1");
        assert_eq!(mock.calls("associate_route_table"), 2);
        assert_eq!(mock.calls("create_default_route"), 1);
    }

    #[tokio::test]
    async fn existing_route_table_short_circuits() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = CreateRouteTableStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.aws.route_table_id = "rtb-kept".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();
        assert_eq!(mock.calls("create_route_table"), 0);
    }
}
