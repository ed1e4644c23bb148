use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `PENDING -> RUNNING -> (SUCCEEDED | FAILED | CANCELED)`; `FAILED` may be
/// requeued once per retry budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskState {
    /// Whether `next` is a legal transition from `self` in the state
    /// machine described by spec §3.
    #[must_use]
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::{Canceled, Failed, Pending, Running, Succeeded};
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Canceled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Canceled)
                | (Failed, Pending) // requeue
        )
    }
}

/// Which task kinds are retried on transient failure is a property of the
/// kind, not the runner (spec §4.K: "Exit-code classification lives with
/// the task kind, not the runner").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum TaskKind {
    ProbePlatform,
    InstallCapability,
    EnsureInterpreter,
    CreateEnvironment,
    InstallDependencies,
    InstallDevTools,
    InstallHooks,
    EmitActivationScripts,
    ComputeFingerprint,
    Regenerate,
    Validate,
    Fix,
    Clean,
}

impl TaskKind {
    /// Kinds whose subprocess work talks to the network (package index,
    /// managed-interpreter downloader) and can therefore fail transiently.
    #[must_use]
    pub fn is_network_bound(self) -> bool {
        matches!(
            self,
            TaskKind::InstallCapability
                | TaskKind::EnsureInterpreter
                | TaskKind::InstallDependencies
                | TaskKind::InstallDevTools
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_bytes: Option<u64>,
    pub max_cpu_time: Option<std::time::Duration>,
    pub max_wall_clock: Option<std::time::Duration>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_bytes: None,
            max_cpu_time: None,
            max_wall_clock: Some(std::time::Duration::from_secs(30 * 60)),
        }
    }
}

/// `{id, kind, payload, parent_id?, deadline, resource_limits, state, attempts, result}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub payload: serde_json::Value,
    pub parent_id: Option<String>,
    pub deadline: Option<time::OffsetDateTime>,
    pub resource_limits: ResourceLimits,
    pub state: TaskState,
    pub attempts: u32,
    pub retry_budget: u32,
    pub result: Option<TaskResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskResult {
    pub ok: bool,
    pub message: String,
    pub details: serde_json::Value,
}

impl Task {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TaskKind, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            payload,
            parent_id: None,
            deadline: None,
            resource_limits: ResourceLimits::default(),
            state: TaskState::Pending,
            attempts: 0,
            retry_budget: if kind.is_network_bound() { 3 } else { 0 },
            result: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.state == TaskState::Failed && self.attempts <= self.retry_budget
    }
}

/// `{task_id, step_index, step_name, completed_at, payload_digest}` written
/// atomically after each idempotent step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub task_id: String,
    pub step_index: usize,
    pub step_name: String,
    pub completed_at: String,
    pub payload_digest: String,
    #[serde(default)]
    pub fallback_taken: bool,
}

/// The durable log of checkpoints for one task, keyed by step index, used
/// by the planner to decide where a rerun should resume (spec §4.I).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CheckpointLog {
    pub entries: BTreeMap<usize, Checkpoint>,
}

impl CheckpointLog {
    #[must_use]
    pub fn path(env_root: &std::path::Path, task_id: &str) -> PathBuf {
        env_root
            .join(".dht")
            .join("checkpoints")
            .join(format!("{task_id}.json"))
    }

    /// First step index whose checkpoint is missing or whose recorded
    /// input digest no longer matches `current_digest(step_index)` — spec
    /// §4.I: "A step is invalidated when its input digest changes."
    #[must_use]
    pub fn first_pending_step(&self, digests: &[String]) -> usize {
        for (idx, digest) in digests.iter().enumerate() {
            match self.entries.get(&idx) {
                Some(checkpoint) if &checkpoint.payload_digest == digest => continue,
                _ => return idx,
            }
        }
        digests.len()
    }

    pub fn record(&mut self, checkpoint: Checkpoint) {
        self.entries.insert(checkpoint.step_index, checkpoint);
    }

    #[must_use]
    pub fn any_fallback_taken(&self) -> bool {
        self.entries.values().any(|c| c.fallback_taken)
    }
}
