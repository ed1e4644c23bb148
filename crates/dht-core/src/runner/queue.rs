//! Durable on-disk task queue (spec §4.K), persisted as JSON under the
//! environment directory so a crashed runner resumes from `submit`'s
//! last-known state rather than losing queued work, mirroring the
//! checkpoint log's persist-then-record discipline in
//! [`crate::engine`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dht_domain::{Task, TaskState};

use crate::effects::Effects;

fn queue_path(env_root: &Path) -> PathBuf {
    env_root.join(".dht").join("tasks").join("queue.json")
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct TaskQueue {
    pub tasks: Vec<Task>,
}

impl TaskQueue {
    #[must_use]
    pub fn load(effects: &dyn Effects, env_root: &Path) -> Self {
        effects
            .fs()
            .read_to_string(&queue_path(env_root))
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    /// Persists the whole queue. Callers save after every state transition
    /// so a killed process resumes from the last durable write (spec §5:
    /// "checkpoint writes happen-before any observer sees a step as
    /// complete").
    pub fn save(&self, effects: &dyn Effects, env_root: &Path) -> Result<()> {
        let path = queue_path(env_root);
        if let Some(parent) = path.parent() {
            effects.fs().create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self).context("serializing task queue")?;
        effects.fs().write(&path, contents.as_bytes())
    }

    /// Appends a new task in `Pending` state and returns its id.
    pub fn submit(&mut self, task: Task) -> String {
        let id = task.id.clone();
        self.tasks.push(task);
        id
    }

    pub fn get_mut(&mut self, task_id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Next task eligible to run: `Pending`, and if it has a parent, that
    /// parent must already be `Succeeded` (spec §4.K ordering rule).
    #[must_use]
    pub fn next_runnable(&self) -> Option<String> {
        self.tasks
            .iter()
            .find(|t| {
                t.state == TaskState::Pending
                    && t.parent_id
                        .as_ref()
                        .is_none_or(|parent_id| self.get(parent_id).map(|p| p.state) == Some(TaskState::Succeeded))
            })
            .map(|t| t.id.clone())
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.tasks.iter().any(|t| t.state == TaskState::Pending || t.state == TaskState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::fake::FakeEffects;

    #[test]
    fn submitted_task_round_trips_through_save_and_load() {
        let effects = FakeEffects::new();
        let mut queue = TaskQueue::default();
        let task = Task::new("t1", dht_domain::TaskKind::ProbePlatform, serde_json::json!({}));
        queue.submit(task);
        queue.save(&effects, Path::new("/env")).unwrap();

        let reloaded = TaskQueue::load(&effects, Path::new("/env"));
        assert_eq!(reloaded.tasks.len(), 1);
        assert_eq!(reloaded.tasks[0].id, "t1");
    }

    #[test]
    fn child_task_is_not_runnable_until_parent_succeeds() {
        let mut queue = TaskQueue::default();
        let parent = Task::new("parent", dht_domain::TaskKind::ProbePlatform, serde_json::json!({}));
        let child = Task::new("child", dht_domain::TaskKind::EnsureInterpreter, serde_json::json!({})).with_parent("parent");
        queue.submit(parent);
        queue.submit(child);

        assert_eq!(queue.next_runnable().as_deref(), Some("parent"));
        queue.get_mut("parent").unwrap().state = TaskState::Succeeded;
        assert_eq!(queue.next_runnable().as_deref(), Some("child"));
    }

    #[test]
    fn idle_queue_has_no_pending_or_running_tasks() {
        let mut queue = TaskQueue::default();
        assert!(queue.is_idle());
        queue.submit(Task::new("t1", dht_domain::TaskKind::ProbePlatform, serde_json::json!({})));
        assert!(!queue.is_idle());
    }
}
