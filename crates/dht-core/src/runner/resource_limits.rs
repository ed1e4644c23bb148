//! Wall-clock enforcement for running tasks (spec §4.K, §5). `max_cpu_time`
//! and `max_memory_bytes` are declared on [`dht_domain::ResourceLimits`] but
//! are not enforced anywhere yet — no subprocess boundary in this crate
//! reads them, so a task that is CPU- or memory-unbounded only fails once
//! its wall clock runs out. Tracked as an open gap rather than silently
//! claimed: enforcing them would mean rlimit-style setup at the point a
//! step spawns its subprocess (`crate::process`), which doesn't exist today.

use std::time::{Duration, Instant};

use dht_domain::{DhtError, ResourceLimits};

pub struct Stopwatch {
    started_at: Instant,
    limit: Option<Duration>,
}

impl Stopwatch {
    #[must_use]
    pub fn start(limits: &ResourceLimits) -> Self {
        Self {
            started_at: Instant::now(),
            limit: limits.max_wall_clock,
        }
    }

    /// Returns an error the instant the wall-clock budget for this task is
    /// exceeded; callers check this between steps, not asynchronously, so
    /// a step already blocked in a subprocess call is not preempted mid-call
    /// (spec: "the runner enforces it via a wrapper" applies at the
    /// subprocess boundary, not here).
    pub fn check(&self, step: &str) -> Result<(), DhtError> {
        if let Some(limit) = self.limit {
            let elapsed = self.started_at.elapsed();
            if elapsed > limit {
                return Err(DhtError::ResourceExceeded {
                    step: step.to_string(),
                    limit: format!("wall_clock={}s", limit.as_secs()),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_while_under_the_limit() {
        let limits = ResourceLimits {
            max_memory_bytes: None,
            max_cpu_time: None,
            max_wall_clock: Some(Duration::from_secs(30 * 60)),
        };
        let stopwatch = Stopwatch::start(&limits);
        assert!(stopwatch.check("probe_platform").is_ok());
    }

    #[test]
    fn check_fails_once_the_limit_has_elapsed() {
        let limits = ResourceLimits {
            max_memory_bytes: None,
            max_cpu_time: None,
            max_wall_clock: Some(Duration::from_millis(0)),
        };
        let stopwatch = Stopwatch::start(&limits);
        std::thread::sleep(Duration::from_millis(5));
        let err = stopwatch.check("install_dependencies").unwrap_err();
        assert!(matches!(err, DhtError::ResourceExceeded { .. }));
    }

    #[test]
    fn no_configured_limit_never_fails() {
        let limits = ResourceLimits { max_memory_bytes: None, max_cpu_time: None, max_wall_clock: None };
        let stopwatch = Stopwatch::start(&limits);
        std::thread::sleep(Duration::from_millis(2));
        assert!(stopwatch.check("noop").is_ok());
    }
}
