//! Attaches the command runner for the machine the task is working on.

use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use crate::config::Config;
use crate::runner::{DryRunner, SshRunner, SshRunnerConfig};
use crate::workflow::Step;

pub const STEP_NAME: &str = "ssh";

/// Builds the SSH runner from the machine's public address and the
/// bootstrap key. In dry-run mode a recording runner is attached instead.
#[derive(Debug, Default)]
pub struct SshStep;

impl SshStep {
    pub fn new() -> Self {
        SshStep
    }
}

#[async_trait]
impl Step for SshStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        if config.dry_run {
            if config.runner.is_none() {
                config.runner = Some(Arc::new(DryRunner::new()));
            }
            return Ok(());
        }

        let runner = SshRunner::new(SshRunnerConfig {
            host: config.node.public_ip.clone(),
            port: config.ssh.port.clone(),
            user: config.ssh.user.clone(),
            key: config.ssh.bootstrap_private_key.clone().into_bytes(),
            timeout_secs: config.ssh.timeout_secs,
        })
        .map_err(|err| Error::Internal(format!("ssh step: {}", err)))?;

        config.runner = Some(Arc::new(runner));
        Ok(())
    }

    fn name(&self) -> &'static str {
        STEP_NAME
    }

    fn description(&self) -> &'static str {
        "attaches the ssh runner used by the install steps"
    }
}
