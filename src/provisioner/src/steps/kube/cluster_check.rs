//! Cluster check: waits until every planned machine reports Ready.

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

pub const STEP_NAME: &str = "cluster_check";

const DEFAULT_CHECK_PERIOD: Duration = Duration::from_secs(10);

/// Polls the node count script on a master until the number of Ready
/// machines matches `cluster_check.machine_count`.
pub struct ClusterCheckStep {
    templates: Arc<TemplateManager>,
    check_period: Duration,
}

impl ClusterCheckStep {
    pub fn new(templates: Arc<TemplateManager>) -> Self {
        ClusterCheckStep {
            templates,
            check_period: DEFAULT_CHECK_PERIOD,
        }
    }

    pub fn with_check_period(mut self, check_period: Duration) -> Self {
        self.check_period = check_period;
        self
    }
}

fn parse_ready_count(stdout: &str) -> Option<usize> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix("ready ")?.trim().parse().ok())
}

#[async_trait]
impl Step for ClusterCheckStep {
    async fn run(
        &self,
        ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()> {
        let runner = require_runner(config)?;
        let expected = config.cluster_check.machine_count;
        let data = json!({ "machine_count": expected });

        if config.dry_run {
            // Dry runs only validate rendering and connectivity.
            run_template(ctx, &self.templates, STEP_NAME, runner.as_ref(), out, &data)
                .await?;
            return Ok(());
        }

        let timeout_secs = match config.cluster_check.timeout_secs {
            0 => 600,
            secs => secs,
        };
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);

        loop {
            match run_template(ctx, &self.templates, STEP_NAME, runner.as_ref(), out, &data)
                .await
            {
                Ok(result) => {
                    if let Some(ready) = parse_ready_count(&result.stdout) {
                        if ready >= expected {
                            tracing::info!(
                                "[ClusterCheck] {} of {} machines ready",
                                ready,
                                expected
                            );
                            return Ok(());
                        }
                        tracing::debug!(
                            "[ClusterCheck] {} of {} machines ready",
                            ready,
                            expected
                        );
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(err) => {
                    tracing::debug!("[ClusterCheck] probe failed: {}", err);
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
        "waits until the expected number of machines report Ready"
    }

    fn depends(&self) -> Vec<&'static str> {
        vec![KUBELET]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{DryRunner, ExecResult, Runner};

    struct CountingRunner {
        ready: usize,
    }

    #[async_trait]
    impl Runner for CountingRunner {
        async fn run(&self, _ctx: &CancellationToken, _script: &str) -> Result<ExecResult> {
            Ok(ExecResult {
                exit_code: 0,
                stdout: format!("expected x machines\nready {}\n", self.ready),
                stderr: String::new(),
            })
        }
    }

    fn templates() -> Arc<TemplateManager> {
        Arc::new(TemplateManager::from_embedded().unwrap())
    }

    #[test]
    fn parses_the_ready_line() {
        assert_eq!(parse_ready_count("expected 7 machines\nready 7\n"), Some(7));
        assert_eq!(parse_ready_count("garbage"), None);
    }

    #[tokio::test]
    async fn passes_when_counts_match() {
        let step = ClusterCheckStep::new(templates());
        let mut config = Config::default();
        config.cluster_check.machine_count = 3;
        config.runner = Some(Arc::new(CountingRunner { ready: 3 }));

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn short_count_times_out() {
        let step =
            ClusterCheckStep::new(templates()).with_check_period(Duration::from_millis(50));
        let mut config = Config::default();
        config.cluster_check.machine_count = 3;
        config.cluster_check.timeout_secs = 1;
        config.runner = Some(Arc::new(CountingRunner { ready: 1 }));

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        let err = step.run(&ctx, &mut sink, &mut config).await.unwrap_err();
        assert!(matches!(err, Error::TimeoutExceeded));
    }

    #[tokio::test]
    async fn dry_run_validates_rendering_only() {
        let step = ClusterCheckStep::new(templates());
        let runner = Arc::new(DryRunner::new());
        let mut config = Config::default();
        config.dry_run = true;
        config.cluster_check.machine_count = 9;
        config.runner = Some(runner.clone());

        let ctx = CancellationToken::new();
        let mut sink = Vec::new();
        step.run(&ctx, &mut sink, &mut config).await.unwrap();
        assert!(runner.scripts()[0].contains('9'));
    }
}
