//! Structured progress reporting, simplified from the teacher's
//! `core::tooling::progress` (`px-core/src/core/tooling/progress.rs`): no
//! background spinner thread, since every engine step already reports
//! discrete start/finish events rather than a continuous byte count. Output
//! is either human-readable lines on stderr or one JSON object per line on
//! stdout, selected by [`crate::config::GlobalOptions`].

use std::io::Write;

use serde::Serialize;

use crate::config::GlobalOptions;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEvent {
    Started,
    Finished,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
struct ProgressLine<'a> {
    event: StepEvent,
    step: &'a str,
    detail: Option<&'a str>,
}

/// Reports engine-step progress according to the invocation's global
/// options: silent under `--quiet`, one JSON object per line under
/// `--json`, otherwise a human-readable line per event.
pub struct ProgressReporter {
    quiet: bool,
    json: bool,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(options: &GlobalOptions) -> Self {
        Self { quiet: options.quiet, json: options.json }
    }

    pub fn step_started(&self, step: &str) {
        self.emit(StepEvent::Started, step, None);
    }

    pub fn step_finished(&self, step: &str, detail: Option<&str>) {
        self.emit(StepEvent::Finished, step, detail);
    }

    pub fn step_skipped(&self, step: &str, reason: &str) {
        self.emit(StepEvent::Skipped, step, Some(reason));
    }

    fn emit(&self, event: StepEvent, step: &str, detail: Option<&str>) {
        if self.quiet {
            return;
        }
        if self.json {
            let line = ProgressLine { event, step, detail };
            if let Ok(rendered) = serde_json::to_string(&line) {
                println!("{rendered}");
            }
            return;
        }
        let mut stderr = std::io::stderr();
        let label = match event {
            StepEvent::Started => format!("dht ▸ {step}"),
            StepEvent::Finished => match detail {
                Some(detail) => format!("dht ▸ {step}: {detail}"),
                None => format!("dht ▸ {step} done"),
            },
            StepEvent::Skipped => format!("dht ▸ {step} skipped ({})", detail.unwrap_or("unchanged")),
        };
        let _ = writeln!(stderr, "{label}");
    }
}
