//! Task Runner (spec §4.K): a durable, single-worker queue of typed tasks
//! with resource limits, retries, and cancellation. Acquires the
//! environment-root lock at startup; failure to acquire aborts immediately
//! (spec §5).

pub mod queue;
pub mod resource_limits;
pub mod scheduler;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use dht_domain::{Task, TaskResult};

use crate::effects::SharedEffects;
use crate::engine::lock::EnvironmentLock;
use queue::TaskQueue;

pub struct TaskRunner {
    effects: SharedEffects,
    env_root: PathBuf,
    queue: TaskQueue,
    _lock: EnvironmentLock,
}

impl TaskRunner {
    /// Acquires the environment lock and loads the durable queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is already held by another runner
    /// instance, or the lock file cannot be created.
    pub fn start(effects: SharedEffects, env_root: &Path) -> Result<Self> {
        let lock = EnvironmentLock::try_acquire(env_root)?
            .with_context(|| format!("environment at {} is locked by another runner", env_root.display()))?;
        let queue = TaskQueue::load(effects.as_ref(), env_root);
        Ok(Self { effects, env_root: env_root.to_path_buf(), queue, _lock: lock })
    }

    pub fn submit(&mut self, task: Task) -> Result<String> {
        let id = self.queue.submit(task);
        self.queue.save(self.effects.as_ref(), &self.env_root)?;
        Ok(id)
    }

    pub fn cancel(&mut self, task_id: &str) -> Result<bool> {
        let canceled = scheduler::cancel(&mut self.queue, task_id);
        self.queue.save(self.effects.as_ref(), &self.env_root)?;
        Ok(canceled)
    }

    pub fn run_until_idle(&mut self, execute: &dyn Fn(&Task, &AtomicBool) -> Result<TaskResult>) -> Result<()> {
        scheduler::run_until_idle(self.effects.as_ref(), &self.env_root, &mut self.queue, execute)
    }

    #[must_use]
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.queue.get(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;
    use dht_domain::TaskKind;
    use std::sync::Arc;

    #[test]
    fn second_runner_fails_to_start_while_first_holds_the_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let effects: SharedEffects = Arc::new(FakeEffects::new());
        let _first = TaskRunner::start(effects.clone(), tmp.path()).unwrap();
        let second = TaskRunner::start(effects, tmp.path());
        assert!(second.is_err());
    }

    #[test]
    fn submitted_task_runs_to_completion() {
        let tmp = tempfile::tempdir().unwrap();
        let effects: SharedEffects = Arc::new(FakeEffects::new());
        let mut runner = TaskRunner::start(effects, tmp.path()).unwrap();
        let id = runner
            .submit(Task::new("t1", TaskKind::ProbePlatform, serde_json::json!({})))
            .unwrap();
        runner
            .run_until_idle(&|_task, _flag| Ok(TaskResult { ok: true, message: "ok".into(), details: serde_json::Value::Null }))
            .unwrap();
        assert_eq!(runner.task(&id).unwrap().state, dht_domain::TaskState::Succeeded);
    }
}
