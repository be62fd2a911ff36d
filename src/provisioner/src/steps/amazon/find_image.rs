//! AMI lookup.

use async_trait::async_trait;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::Result;

use crate::config::Config;
use crate::workflow::Step;

use super::{GetEc2Fn, IMAGE_NAME_FILTER, IMAGE_OWNER};

pub const STEP_NAME: &str = "aws_find_image";

pub struct FindImageStep {
    get_ec2: GetEc2Fn,
}

impl FindImageStep {
    pub fn new(get_ec2: GetEc2Fn) -> Self {
        FindImageStep { get_ec2 }
    }
}

#[async_trait]
impl Step for FindImageStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if !config.aws.image_id.is_empty() {
            tracing::info!(
                "[{}] image {} already chosen, skipping",
                STEP_NAME,
                config.aws.image_id
            );
            return Ok(());
        }

        let ec2 = (self.get_ec2)(&config.aws)?;
        config.aws.image_id = ec2.find_image(IMAGE_OWNER, IMAGE_NAME_FILTER).await?;
        let _ = writeln!(out, "image {} selected", config.aws.image_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "finds the base machine image for the region"
    }
}
