//! Creates and attaches the internet gateway.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::{resource_tags, GetEc2Fn};

pub const STEP_NAME: &str = "aws_create_internet_gateway";

pub struct CreateInternetGatewayStep {
    get_ec2: GetEc2Fn,
}

impl CreateInternetGatewayStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        CreateInternetGatewayStep { get_ec2 }
    }
}

#[async_trait]
impl Step for CreateInternetGatewayStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.internet_gateway_id.is_empty() {
            tracing::info!(
                "[{}] internet gateway {} already set, skipping",
                STEP_NAME,
                config.aws.internet_gateway_id
            );
            return Ok(());
        }
        if config.aws.vpc_id.is_empty() {
            return Err(Error::InvalidArguments(
                "aws_create_internet_gateway needs a vpc id".to_string(),
            ));
        }

        let ec2 = (self.get_ec2)(&config.aws)?;
        let igw_id = ec2.create_internet_gateway().await?;
        ec2.attach_internet_gateway(&igw_id, &config.aws.vpc_id)
            .await?;
        ec2.create_tags(
            &igw_id,
            &resource_tags(config, &format!("{}-igw", config.cluster_name)),
        )
        .await?;

        config.aws.internet_gateway_id = igw_id;
        let _ = writeln!(out, "internet gateway {} attached", config.aws.internet_gateway_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "creates the internet gateway and attaches it to the VPC"
    }

    fn depends(&self) -> Vec<&'static str> {
        vec![super::create_vpc::STEP_NAME]
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests_support::MockEc2;
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn already_set_gateway_makes_no_api_calls() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = CreateInternetGatewayStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.aws.internet_gateway_id = "igw-kept".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(mock.calls("create_internet_gateway"), 0);
        assert_eq!(mock.calls("attach_internet_gateway"), 0);
    }

    #[tokio::test]
    async fn creates_attaches_and_tags() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = CreateInternetGatewayStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.aws.vpc_id = "vpc-1".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(config.aws.internet_gateway_id, "igw-1");
        assert_eq!(mock.calls("attach_internet_gateway"), 1);
        assert_eq!(mock.calls("create_tags"), 1);
    }
}
