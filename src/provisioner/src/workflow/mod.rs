//! Workflow engine: the step/workflow registries and the persisted task.
//!
//! Both registries are filled once at process init and read-only after
//! that. Registering the same name twice is a fatal startup error.

mod step;
mod task;

pub use step::{Status, Step, StepStatus};
pub use task::{Task, WORKFLOWS_PREFIX};

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Workflow names known to the planner.
pub const DIGITALOCEAN_MASTER: &str = "digitalocean_master";
pub const DIGITALOCEAN_NODE: &str = "digitalocean_node";
pub const DIGITALOCEAN_DELETE_NODE: &str = "digitalocean_delete_node";
pub const DIGITALOCEAN_DELETE_CLUSTER: &str = "digitalocean_delete_cluster";
pub const AWS_MASTER: &str = "aws_master";
pub const AWS_NODE: &str = "aws_node";
pub const AWS_PRE_PROVISION: &str = "aws_pre_provision";
pub const AWS_DELETE_NODE: &str = "aws_delete_node";
pub const AWS_DELETE_CLUSTER: &str = "aws_delete_cluster";
pub const GCE_MASTER: &str = "gce_master";
pub const GCE_NODE: &str = "gce_node";
pub const GCE_DELETE_NODE: &str = "gce_delete_node";
pub const GCE_DELETE_CLUSTER: &str = "gce_delete_cluster";
pub const CLUSTER: &str = "cluster";

/// The workflows a provider contributes to provisioning.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSet {
    pub pre_provision: Option<&'static str>,
    pub provision_master: &'static str,
    pub provision_node: &'static str,
}

/// Immutable ordered list of steps under a name.
#[derive(Clone)]
pub struct Workflow {
    pub name: &'static str,
    pub steps: Vec<Arc<dyn Step>>,
}

lazy_static! {
    static ref STEPS: RwLock<HashMap<&'static str, Arc<dyn Step>>> =
        RwLock::new(HashMap::new());
    static ref WORKFLOWS: RwLock<HashMap<&'static str, Workflow>> =
        RwLock::new(HashMap::new());
}

/// Register a step process-wide. Panics on duplicate names and on advisory
/// dependencies that are not registered yet.
pub fn register_step(step: Arc<dyn Step>) {
    let mut steps = STEPS.write().expect("step registry poisoned");
    let name = step.name();
    for dep in step.depends() {
        if !steps.contains_key(dep) {
            panic!("step {} depends on unregistered step {}", name, dep);
        }
    }
    if steps.insert(name, step).is_some() {
        panic!("step {} registered twice", name);
    }
}

pub fn get_step(name: &str) -> Option<Arc<dyn Step>> {
    STEPS
        .read()
        .expect("step registry poisoned")
        .get(name)
        .cloned()
}

/// Register a workflow from already registered step names. Panics on
/// unknown steps and duplicate workflow names.
pub fn register_workflow(name: &'static str, step_names: &[&str]) {
    let steps = step_names
        .iter()
        .map(|step_name| {
            get_step(step_name)
                .unwrap_or_else(|| panic!("workflow {} uses unknown step {}", name, step_name))
        })
        .collect();

    let mut workflows = WORKFLOWS.write().expect("workflow registry poisoned");
    if workflows
        .insert(name, Workflow { name, steps })
        .is_some()
    {
        panic!("workflow {} registered twice", name);
    }
}

pub fn get_workflow(name: &str) -> Option<Workflow> {
    WORKFLOWS
        .read()
        .expect("workflow registry poisoned")
        .get(name)
        .cloned()
}
