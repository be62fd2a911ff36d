//! A persisted, identifiable workflow instance.
//!
//! The task is exclusively owned by the runner driving it; the repository
//! is the only shared surface. Status is persisted after every transition
//! so a crash mid-step leaves `executing` behind, which a restart treats
//! as "resume here".

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cluster::{Error, Result, Storage};

use crate::config::Config;
use crate::runner::{SshRunner, SshRunnerConfig};

use super::step::{Status, Step, StepStatus};
use super::{get_workflow, Workflow};

pub const WORKFLOWS_PREFIX: &str = "workflows";

#[derive(Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub workflow_type: String,
    pub config: Config,
    #[serde(rename = "stepStatuses")]
    pub step_statuses: Vec<StepStatus>,

    #[serde(skip)]
    steps: Vec<Arc<dyn Step>>,
    #[serde(skip)]
    repository: Option<Arc<dyn Storage>>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("workflow_type", &self.workflow_type)
            .field("step_statuses", &self.step_statuses)
            .finish()
    }
}

impl Task {
    /// Create a task for a registered workflow, persist its initial state
    /// and return it. The fresh UUID doubles as the source of the machine
    /// name suffix for master and node tasks.
    pub async fn new(workflow_type: &str, repository: Arc<dyn Storage>) -> Result<Task> {
        let workflow = get_workflow(workflow_type)
            .ok_or_else(|| Error::NotFound(format!("workflow {}", workflow_type)))?;

        let task = Self::build(workflow, repository);
        task.sync().await?;
        Ok(task)
    }

    /// Build a task around an explicit workflow. Used by tests and
    /// embedders that compose step sets outside the registry; not
    /// persisted until the first transition.
    pub fn with_workflow(workflow: Workflow, repository: Arc<dyn Storage>) -> Task {
        Self::build(workflow, repository)
    }

    fn build(workflow: Workflow, repository: Arc<dyn Storage>) -> Task {
        let step_statuses = workflow
            .steps
            .iter()
            .map(|step| StepStatus::todo(step.name()))
            .collect();

        Task {
            id: Uuid::new_v4().to_string(),
            workflow_type: workflow.name.to_string(),
            config: Config::default(),
            step_statuses,
            steps: workflow.steps,
            repository: Some(repository),
        }
    }

    /// Load a persisted task and restore its live parts.
    pub async fn load(id: &str, repository: Arc<dyn Storage>) -> Result<Task> {
        let data = repository
            .get(WORKFLOWS_PREFIX, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {}", id)))?;
        Self::from_bytes(&data, repository)
    }

    /// Restore a task from its persisted form: reattach the workflow steps
    /// by name and, when the machine already has a public address, rebuild
    /// the SSH runner from the persisted SSH section. A blank address
    /// means machine creation never finished, no runner is attached.
    pub fn from_bytes(data: &[u8], repository: Arc<dyn Storage>) -> Result<Task> {
        let mut task: Task = serde_json::from_slice(data)?;
        let workflow = get_workflow(&task.workflow_type)
            .ok_or_else(|| Error::NotFound(format!("workflow {}", task.workflow_type)))?;
        task.steps = workflow.steps;
        task.repository = Some(repository);

        if !task.config.node.public_ip.is_empty() {
            let runner = SshRunner::new(SshRunnerConfig {
                host: task.config.node.public_ip.clone(),
                port: task.config.ssh.port.clone(),
                user: task.config.ssh.user.clone(),
                key: task.config.ssh.bootstrap_private_key.clone().into_bytes(),
                timeout_secs: task.config.ssh.timeout_secs,
            })?;
            task.config.runner = Some(Arc::new(runner));
        }

        Ok(task)
    }

    /// Run the task against the given config snapshot, resuming from the
    /// first step that is not `success`. At most one run may be active per
    /// task, which exclusive ownership already enforces.
    pub async fn run(
        &mut self,
        ctx: CancellationToken,
        config: Config,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        self.config = config;
        self.config.task_id = self.id.clone();
        self.start_from(ctx, self.first_pending(), out).await
    }

    /// Resume with the persisted config. Callers reattach live channels
    /// beforehand; completed steps are skipped without re-invocation.
    pub async fn rerun(
        &mut self,
        ctx: CancellationToken,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        self.config.task_id = self.id.clone();
        self.start_from(ctx, self.first_pending(), out).await
    }

    /// Roll back every step that got to run, last first. Rollback errors
    /// are logged and swallowed.
    pub async fn rollback(
        &mut self,
        ctx: CancellationToken,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        let last = self.first_pending().min(self.steps.len());
        for index in (0..last).rev() {
            let step = self.steps[index].clone();
            if let Err(err) = step.rollback(&ctx, out, &mut self.config).await {
                tracing::warn!(
                    "[Task] rollback of step {} in task {} failed: {}",
                    step.name(),
                    self.id,
                    err
                );
            }
        }
        Ok(())
    }

    fn first_pending(&self) -> usize {
        self.step_statuses
            .iter()
            .position(|status| status.status != Status::Success)
            .unwrap_or(self.step_statuses.len())
    }

    async fn start_from(
        &mut self,
        ctx: CancellationToken,
        start: usize,
        out: &mut (dyn Write + Send),
    ) -> Result<()> {
        for index in start..self.steps.len() {
            let step = self.steps[index].clone();

            if ctx.is_cancelled() {
                self.mark(index, Status::Cancelled, "cancelled");
                self.sync().await?;
                return Err(Error::Cancelled);
            }

            tracing::debug!("[Task] {} step {}", self.id, step.name());
            self.step_statuses[index].started_at = Some(chrono::Utc::now());
            self.mark(index, Status::Executing, "");
            self.sync().await?;

            match step.run(&ctx, out, &mut self.config).await {
                Ok(()) => {
                    self.step_statuses[index].ended_at = Some(chrono::Utc::now());
                    self.mark(index, Status::Success, "");
                    self.sync().await?;
                }
                Err(err) => {
                    let status = if matches!(err, Error::Cancelled) {
                        Status::Cancelled
                    } else {
                        Status::Error
                    };
                    self.step_statuses[index].ended_at = Some(chrono::Utc::now());
                    self.mark(index, status, &err.to_string());
                    self.sync().await?;
                    tracing::error!(
                        "[Task] {} step {} failed: {}",
                        self.id,
                        step.name(),
                        err
                    );
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn mark(&mut self, index: usize, status: Status, err_msg: &str) {
        let entry = &mut self.step_statuses[index];
        entry.status = status;
        entry.err_msg = err_msg.to_string();
    }

    async fn sync(&self) -> Result<()> {
        let Some(repository) = &self.repository else {
            return Ok(());
        };
        let data = serde_json::to_vec(self)?;
        repository.put(WORKFLOWS_PREFIX, &self.id, data).await
    }
}
