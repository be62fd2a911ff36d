//! Creates one subnet per availability zone of the region.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::workflow::Step;

use super::{resource_tags, GetEc2Fn};

pub const STEP_NAME: &str = "aws_create_subnets";

pub struct CreateSubnetsStep {
    get_ec2: GetEc2Fn,
}

impl CreateSubnetsStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        CreateSubnetsStep { get_ec2 }
    }
}

#[async_trait]
impl Step for CreateSubnetsStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.subnets.is_empty() {
            tracing::info!("[{}] subnets already exist, skipping", STEP_NAME);
            return Ok(());
        }
        if config.aws.vpc_id.is_empty() {
            return Err(Error::InvalidArguments(
                "aws_create_subnets needs a vpc id".to_string(),
            ));
        }

        let ec2 = (self.get_ec2)(&config.aws)?;
        let zones = ec2.describe_availability_zones().await?;

        for (index, az) in zones.iter().enumerate() {
            let cidr = format!("10.2.{}.0/24", index);
            let subnet_id = ec2.create_subnet(&config.aws.vpc_id, az, &cidr).await?;
            ec2.create_tags(
                &subnet_id,
                &resource_tags(config, &format!("{}-subnet-{}", config.cluster_name, az)),
            )
            .await?;
            let _ = writeln!(out, "subnet {} created in {}", subnet_id, az);
            config.aws.subnets.insert(az.clone(), subnet_id);
        }

        if let Some(first) = zones.first() {
            if config.aws.availability_zone.is_empty() {
                config.aws.availability_zone = first.clone();
            }
        }
        if let Some(subnet) = config.aws.subnets.get(&config.aws.availability_zone) {
            config.aws.subnet_id = subnet.clone();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "creates one subnet per availability zone"
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
    async fn creates_a_subnet_per_zone() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = CreateSubnetsStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.aws.vpc_id = "vpc-1".to_string();

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(mock.calls("create_subnet"), 2);
        assert_eq!(config.aws.subnets.len(), 2);
        assert_eq!(config.aws.availability_zone, "us-east-1a");
        assert_eq!(config.aws.subnet_id, "subnet-us-east-1a");
    }

    #[tokio::test]
    async fn existing_subnets_short_circuit() {
        let mock = Arc::new(MockEc2::default());
        let ec2 = mock.clone();
        let step = CreateSubnetsStep::new(Arc::new(move |_| Ok(ec2.clone())));

        let mut config = Config::default();
        config.aws.vpc_id = "vpc-1".to_string();
        config
            .aws
            .subnets
            .insert("us-east-1a".to_string(), "subnet-kept".to_string());

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();

        assert_eq!(mock.calls("create_subnet"), 0);
    }
}
