//! Step contract and per-step status bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use tokio_util::sync::CancellationToken;

use cluster::Result;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Todo,
    Executing,
    Success,
    Error,
    Cancelled,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Todo => "todo",
            Status::Executing => "executing",
            Status::Success => "success",
            Status::Error => "error",
            Status::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Persisted status of one step within a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStatus {
    #[serde(rename = "stepName")]
    pub step_name: String,
    pub status: Status,
    #[serde(default, rename = "errMsg")]
    pub err_msg: String,
    #[serde(default, rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "endedAt")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl StepStatus {
    pub fn todo(step_name: &str) -> Self {
        StepStatus {
            step_name: step_name.to_string(),
            status: Status::Todo,
            err_msg: String::new(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// An idempotent, rollback-capable unit of work.
///
/// Steps are stateless; all mutable data lives in the config. On rerun a
/// step either short-circuits when its post-condition already holds or
/// produces equivalent state.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(
        &self,
        ctx: &CancellationToken,
        out: &mut (dyn Write + Send),
        config: &mut Config,
    ) -> Result<()>;

    /// Best effort undo. Never fails the overall workflow.
    async fn rollback(
        &self,
        _ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        _config: &mut Config,
    ) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Advisory dependency list, validated at registration time. The
    /// engine never reorders steps based on it.
    fn depends(&self) -> Vec<&'static str> {
        Vec::new()
    }
}
