//! Single-worker scheduling loop (spec §4.K, §5: "a single in-process
//! worker executes engine steps sequentially"). Parallelism, where it
//! exists, lives inside the subprocesses a step spawns, never between
//! steps themselves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use anyhow::Result;
use dht_domain::{DhtError, Task, TaskResult, TaskState};

use super::queue::TaskQueue;
use super::resource_limits::Stopwatch;
use crate::effects::Effects;

/// Cancellation flags for tasks currently executing, keyed by task id. A
/// `Running` task registers itself here so `cancel()` (possibly called from
/// another thread, e.g. a signal handler) has something to set (spec §4.K:
/// "cancellation of a running task takes effect within its grace window").
fn running_flags() -> &'static Mutex<BTreeMap<String, Arc<AtomicBool>>> {
    static FLAGS: OnceLock<Mutex<BTreeMap<String, Arc<AtomicBool>>>> = OnceLock::new();
    FLAGS.get_or_init(|| Mutex::new(BTreeMap::new()))
}

/// Runs one task to completion against `execute`, updating its state and
/// consuming retry budget on a retryable failure (spec §4.K: "a task's
/// declared retry budget is consumed only for transient kinds"). `execute`
/// receives a cancellation flag it should poll inside any blocking step
/// (e.g. via [`crate::process::run_command_cancelable`]); if the flag ends
/// up set, the task is forced to `Canceled` regardless of what `execute`
/// returned.
fn run_one(task: &mut Task, execute: &dyn Fn(&Task, &AtomicBool) -> Result<TaskResult>) {
    task.state = TaskState::Running;
    task.attempts += 1;

    let flag = Arc::new(AtomicBool::new(false));
    running_flags().lock().unwrap().insert(task.id.clone(), flag.clone());

    let stopwatch = Stopwatch::start(&task.resource_limits);

    let outcome = execute(task, &flag).and_then(|result| {
        stopwatch
            .check(&format!("{:?}", task.kind))
            .map(|()| result)
            .map_err(anyhow::Error::from)
    });

    running_flags().lock().unwrap().remove(&task.id);

    if flag.load(Ordering::SeqCst) {
        task.state = TaskState::Canceled;
        task.result = Some(TaskResult {
            ok: false,
            message: "task canceled".to_string(),
            details: serde_json::Value::Null,
        });
        return;
    }

    match outcome {
        Ok(result) => {
            task.state = TaskState::Succeeded;
            task.result = Some(result);
        }
        Err(err) => {
            let dht_err = err.downcast_ref::<DhtError>();
            let retryable = dht_err.is_some_and(DhtError::is_retryable);
            task.state = TaskState::Failed;
            task.result = Some(TaskResult {
                ok: false,
                message: err.to_string(),
                details: serde_json::Value::Null,
            });
            if retryable && task.can_retry() {
                task.state = TaskState::Pending;
            }
        }
    }
}

pub const CANCELLATION_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Requests cancellation of `task_id`. A `Pending` task is canceled
/// immediately. A `Running` task has its cancellation flag set and this
/// call blocks, polling in 20ms increments, for up to
/// [`CANCELLATION_GRACE_PERIOD`] for the task to observe the flag and stop
/// (spec §4.K: "cancellation of a running task takes effect within its
/// grace window"); whether it actually stopped in time is reflected in the
/// task's final state, not in this function's return value.
pub fn cancel(queue: &mut TaskQueue, task_id: &str) -> bool {
    match queue.get_mut(task_id).map(|task| task.state) {
        Some(TaskState::Pending) => {
            queue.get_mut(task_id).unwrap().state = TaskState::Canceled;
            true
        }
        Some(TaskState::Running) => {
            let flag = running_flags().lock().unwrap().get(task_id).cloned();
            let Some(flag) = flag else { return false };
            flag.store(true, Ordering::SeqCst);
            let start = std::time::Instant::now();
            while start.elapsed() < CANCELLATION_GRACE_PERIOD {
                if !running_flags().lock().unwrap().contains_key(task_id) {
                    break;
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            true
        }
        _ => false,
    }
}

/// Runs tasks from `queue` until no task is `Pending`/`Running`, persisting
/// the queue after every transition so a crash mid-run resumes cleanly.
///
/// # Errors
///
/// Returns an error if the queue cannot be persisted; individual task
/// failures are recorded on the task itself, not propagated.
pub fn run_until_idle(
    effects: &dyn Effects,
    env_root: &std::path::Path,
    queue: &mut TaskQueue,
    execute: &dyn Fn(&Task, &AtomicBool) -> Result<TaskResult>,
) -> Result<()> {
    while let Some(task_id) = queue.next_runnable() {
        let task = queue.get_mut(&task_id).expect("next_runnable returned a known id");
        run_one(task, execute);
        queue.save(effects, env_root)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;
    use dht_domain::TaskKind;

    #[test]
    fn successful_task_transitions_to_succeeded() {
        let effects = FakeEffects::new();
        let mut queue = TaskQueue::default();
        queue.submit(Task::new("t1", TaskKind::ProbePlatform, serde_json::json!({})));

        run_until_idle(&effects, std::path::Path::new("/env"), &mut queue, &|_task, _flag| {
            Ok(TaskResult { ok: true, message: "done".into(), details: serde_json::Value::Null })
        })
        .unwrap();

        assert_eq!(queue.get("t1").unwrap().state, TaskState::Succeeded);
    }

    #[test]
    fn retryable_failure_requeues_until_budget_is_exhausted() {
        let effects = FakeEffects::new();
        let mut queue = TaskQueue::default();
        queue.submit(Task::new("t1", TaskKind::InstallDependencies, serde_json::json!({})));

        run_until_idle(&effects, std::path::Path::new("/env"), &mut queue, &|_task, _flag| {
            Err(anyhow::Error::from(DhtError::TransientNetwork { reason: "timeout".into() }))
        })
        .unwrap();

        let task = queue.get("t1").unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.attempts, task.retry_budget + 1);
    }

    #[test]
    fn non_retryable_failure_stops_after_one_attempt() {
        let effects = FakeEffects::new();
        let mut queue = TaskQueue::default();
        queue.submit(Task::new("t1", TaskKind::InstallDependencies, serde_json::json!({})));

        run_until_idle(&effects, std::path::Path::new("/env"), &mut queue, &|_task, _flag| {
            Err(anyhow::Error::from(DhtError::BuildFailed { name: "pkg".into(), reason: "gcc missing".into() }))
        })
        .unwrap();

        let task = queue.get("t1").unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.attempts, 1);
    }

    #[test]
    fn pending_task_can_be_canceled_before_it_runs() {
        let mut queue = TaskQueue::default();
        queue.submit(Task::new("t1", TaskKind::ProbePlatform, serde_json::json!({})));
        assert!(cancel(&mut queue, "t1"));
        assert_eq!(queue.get("t1").unwrap().state, TaskState::Canceled);
    }

    #[test]
    fn cancel_returns_false_for_a_task_that_is_not_tracked() {
        let mut queue = TaskQueue::default();
        assert!(!cancel(&mut queue, "does-not-exist"));
    }

    #[test]
    fn running_task_observes_cancellation_and_ends_up_canceled() {
        let mut queue = TaskQueue::default();
        let id = queue.submit(Task::new("cancel-running-task", TaskKind::InstallDependencies, serde_json::json!({})));
        let queue_id = id.clone();

        let effects = FakeEffects::new();
        let worker = std::thread::spawn(move || {
            run_until_idle(&effects, std::path::Path::new("/env"), &mut queue, &|_task, flag| {
                while !flag.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(TaskResult { ok: true, message: "done".into(), details: serde_json::Value::Null })
            })
            .unwrap();
            queue
        });

        // Wait for the task to register itself as running before canceling.
        while running_flags().lock().unwrap().get(&queue_id).is_none() {
            std::thread::sleep(Duration::from_millis(5));
        }
        let flag = running_flags().lock().unwrap().get(&queue_id).unwrap().clone();
        flag.store(true, Ordering::SeqCst);

        let queue = worker.join().unwrap();
        assert_eq!(queue.get(&queue_id).unwrap().state, TaskState::Canceled);
    }

    #[test]
    fn cancel_sets_the_flag_for_a_running_task_and_waits_for_it_to_stop() {
        let mut queue = TaskQueue::default();
        let id = queue.submit(Task::new("cancel-flag-probe", TaskKind::ProbePlatform, serde_json::json!({})));
        queue.get_mut(&id).unwrap().state = TaskState::Running;

        let flag = Arc::new(AtomicBool::new(false));
        running_flags().lock().unwrap().insert(id.clone(), flag.clone());

        let stop_id = id.clone();
        let worker = std::thread::spawn(move || {
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            running_flags().lock().unwrap().remove(&stop_id);
        });

        assert!(cancel(&mut queue, &id));
        worker.join().unwrap();
        assert!(!running_flags().lock().unwrap().contains_key(&id));
    }
}
