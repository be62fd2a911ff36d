//! Workflow engine behavior: persisted statuses, halting on failure and
//! resume without re-running completed steps.

use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cluster::{Error, MemoryStorage, Result, Storage};
use provisioner::workflow::{register_step, register_workflow};
use provisioner::{Config, Status, Step, Task};

struct TestStep {
    name: &'static str,
    runs: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Step for TestStep {
    async fn run(
        &self,
        _ctx: &CancellationToken,
        _out: &mut (dyn Write + Send),
        _config: &mut Config,
    ) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal(format!("{} blew up", self.name)));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

fn register_test_step(
    name: &'static str,
) -> (Arc<AtomicUsize>, Arc<AtomicBool>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let fail = Arc::new(AtomicBool::new(false));
    register_step(Arc::new(TestStep {
        name,
        runs: runs.clone(),
        fail: fail.clone(),
    }));
    (runs, fail)
}

fn statuses(task: &Task) -> Vec<Status> {
    task.step_statuses.iter().map(|s| s.status).collect()
}

#[tokio::test]
async fn fresh_run_persists_success_statuses() {
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let (runs_a, _) = register_test_step("ok_a");
    let (runs_b, _) = register_test_step("ok_b");
    register_workflow("wf_ok", &["ok_a", "ok_b"]);

    let mut task = Task::new("wf_ok", repo.clone()).await.unwrap();
    let id = task.id.clone();

    let mut sink = Vec::new();
    task.run(CancellationToken::new(), Config::default(), &mut sink)
        .await
        .unwrap();

    assert_eq!(runs_a.load(Ordering::SeqCst), 1);
    assert_eq!(runs_b.load(Ordering::SeqCst), 1);

    let persisted = Task::load(&id, repo).await.unwrap();
    assert_eq!(statuses(&persisted), vec![Status::Success, Status::Success]);
    assert!(persisted.step_statuses[0].started_at.is_some());
    assert!(persisted.step_statuses[1].ended_at.is_some());
}

#[tokio::test]
async fn first_error_halts_the_workflow() {
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let (runs_a, _) = register_test_step("halt_a");
    let (runs_b, fail_b) = register_test_step("halt_b");
    let (runs_c, _) = register_test_step("halt_c");
    register_workflow("wf_halt", &["halt_a", "halt_b", "halt_c"]);
    fail_b.store(true, Ordering::SeqCst);

    let mut task = Task::new("wf_halt", repo.clone()).await.unwrap();
    let id = task.id.clone();

    let mut sink = Vec::new();
    let err = task
        .run(CancellationToken::new(), Config::default(), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));

    assert_eq!(runs_a.load(Ordering::SeqCst), 1);
    assert_eq!(runs_b.load(Ordering::SeqCst), 1);
    assert_eq!(runs_c.load(Ordering::SeqCst), 0);

    let persisted = Task::load(&id, repo).await.unwrap();
    assert_eq!(
        statuses(&persisted),
        vec![Status::Success, Status::Error, Status::Todo]
    );
    assert!(persisted.step_statuses[1].err_msg.contains("halt_b"));
}

// A task whose first steps already succeeded resumes at the failed step
// and never re-invokes the completed ones.
#[tokio::test]
async fn restart_resumes_from_first_non_success_step() {
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let mut counters = Vec::new();
    let mut fails = Vec::new();
    for name in ["res_1", "res_2", "res_3", "res_4", "res_5"] {
        let (runs, fail) = register_test_step(name);
        counters.push(runs);
        fails.push(fail);
    }
    register_workflow("wf_resume", &["res_1", "res_2", "res_3", "res_4", "res_5"]);

    // Step three fails on the first pass.
    fails[2].store(true, Ordering::SeqCst);

    let mut task = Task::new("wf_resume", repo.clone()).await.unwrap();
    let id = task.id.clone();

    let mut sink = Vec::new();
    task.run(CancellationToken::new(), Config::default(), &mut sink)
        .await
        .unwrap_err();

    let counts: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![1, 1, 1, 0, 0]);

    // The fix lands, the task is reloaded from storage and resumed.
    fails[2].store(false, Ordering::SeqCst);
    let mut resumed = Task::load(&id, repo.clone()).await.unwrap();
    resumed
        .rerun(CancellationToken::new(), &mut sink)
        .await
        .unwrap();

    let counts: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, vec![1, 1, 2, 1, 1]);

    let persisted = Task::load(&id, repo).await.unwrap();
    assert!(persisted
        .step_statuses
        .iter()
        .all(|s| s.status == Status::Success));
}

#[tokio::test]
async fn cancelled_context_stops_before_the_next_step() {
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let (runs, _) = register_test_step("cancel_a");
    register_workflow("wf_cancel", &["cancel_a"]);

    let mut task = Task::new("wf_cancel", repo.clone()).await.unwrap();
    let id = task.id.clone();

    let ctx = CancellationToken::new();
    ctx.cancel();

    let mut sink = Vec::new();
    let err = task
        .run(ctx, Config::default(), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    let persisted = Task::load(&id, repo).await.unwrap();
    assert_eq!(statuses(&persisted), vec![Status::Cancelled]);
}

#[tokio::test]
async fn unknown_workflow_is_not_found() {
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let err = Task::new("wf_missing", repo).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn loading_a_missing_task_is_not_found() {
    let repo: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let err = Task::load("no-such-task", repo).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
