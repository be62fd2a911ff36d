//! Recording runner for dry runs and tests.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use cluster::{Error, Result};

use super::{ExecResult, Runner};

/// Records every script instead of executing it and reports success.
#[derive(Debug, Default)]
pub struct DryRunner {
    scripts: Mutex<Vec<String>>,
}

impl DryRunner {
    pub fn new() -> Self {
        DryRunner::default()
    }

    /// Scripts recorded so far, in execution order.
    pub fn scripts(&self) -> Vec<String> {
        self.scripts.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Runner for DryRunner {
    async fn run(&self, ctx: &CancellationToken, script: &str) -> Result<ExecResult> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(script.to_string());
        }
        Ok(ExecResult::default())
    }
}
