//! Post-start check: bounded poll until the machine reports healthy.

use async_trait::async_trait;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::template::{run_template, TemplateManager};
use crate::workflow::Step;

use super::{require_runner, KUBELET};

pub const STEP_NAME: &str = "post_start";

const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(5);

/// Polls the health probe script until it passes or the step timeout
/// from `post_start.timeout_secs` is exhausted.
pub struct PostStartStep {
    templates: Arc<TemplateManager>,
    check_period: Duration,
}

impl PostStartStep {
    pub fn new(templates: Arc<TemplateManager>) -> Self {
        PostStartStep {
            templates,
            check_period: DEFAULT_CHECK_PERIOD,
        }
    }

    pub fn with_check_period(mut self, check_period: Duration) -> Self {
        self.check_period = check_period;
        self
    }
}

#[async_trait]
impl Step for PostStartStep {
    async fn run(
        &self,
        ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let runner = require_runner(config)?;
        let host = if config.node.private_ip.is_empty() {
            "127.0.0.1".to_string()
        } else {
            config.node.private_ip.clone()
        };
        let data = json!({
            "is_master": config.is_master,
            "host": host,
            "port": config.post_start.port,
        });

        let timeout = Duration::from_secs(config.post_start.timeout_secs.max(1));
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match run_template(ctx, &self.templates, STEP_NAME, runner.as_ref(), out, &data)
                .await
            {
                Ok(_) => return Ok(()),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::debug!("[PostStart] probe on {} not ready: {}", host, err);
                }
            }

            if tokio::time::Instant::now() + self.check_period > deadline {
                return Err(Error::TimeoutExceeded);
            }
            tokio::select! {
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.check_period) => {}
            }
        }
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "post start step executes after provisioning"
    }

    fn depends(&self) -> Vec<&'static str> {
        vec![KUBELET]
    }
}
