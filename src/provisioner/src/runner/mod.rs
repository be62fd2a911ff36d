//! Command runners steps execute scripts through.
//!
//! The runner variant is chosen by the calling step: SSH against a target
//! machine, local exec, or the recording dry runner.

mod dry;
mod shell;
mod ssh;

pub use dry::DryRunner;
pub use shell::ShellRunner;
pub use ssh::{SshRunner, SshRunnerConfig};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use cluster::Result;

/// Outcome of one executed script.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last stderr line, the usual carrier of the actual failure.
    pub fn stderr_tail(&self) -> &str {
        self.stderr.lines().last().unwrap_or("").trim()
    }
}

/// Executes a rendered script as one command and captures its output.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, ctx: &CancellationToken, script: &str) -> Result<ExecResult>;
}
