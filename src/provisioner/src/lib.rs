//! Provisioning orchestrator.
//!
//! Composes idempotent, rollback-capable steps into named workflows,
//! persists per-step status so runs can be resumed, and fans work out over
//! per-node tasks with masters-then-nodes ordering, rate limited cloud
//! calls and a channel-driven cluster state monitor.

pub mod api;
pub mod config;
pub mod embedded;
pub mod provision;
pub mod runner;
pub mod steps;
pub mod template;
pub mod workflow;

pub use config::{Config, ConfigChannels, MonitorReceivers};
pub use provision::{
    CountdownLatch, ProvisionStarted, RateLimiter, TaskProvisioner, TaskRole, WriterFactory,
};
pub use runner::{DryRunner, ExecResult, Runner, ShellRunner, SshRunner};
pub use steps::ProviderClients;
pub use template::TemplateManager;
pub use workflow::{Status, Step, StepStatus, Task, Workflow, WorkflowSet, WORKFLOWS_PREFIX};
