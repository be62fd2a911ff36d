//! Local shell runner.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use super::{ExecResult, Runner};

/// Runs scripts on the local host. Used for provider tooling that talks to
/// the cloud from the control plane itself.
#[derive(Debug, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        ShellRunner
    }
}

#[async_trait]
impl Runner for ShellRunner {
    async fn run(&self, ctx: &CancellationToken, script: &str) -> Result<ExecResult> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| Error::Internal(format!("spawn shell: {}", err)))?;

        let output_fut = child.wait_with_output();
        tokio::pin!(output_fut);

        let output = tokio::select! {
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            output = &mut output_fut => {
                output.map_err(|err| Error::Internal(format!("wait shell: {}", err)))?
            }
        };

        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
