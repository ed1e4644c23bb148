//! Renders a dispatched command's outcome, generalized from the teacher's
//! `px-cli::output` (`px-cli/src/output/mod.rs`): either a human-readable
//! line on stdout or one `{status,message,details}` JSON object, selected
//! by `--json`/`--quiet`.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

pub struct CommandOutcome {
    pub name: &'static str,
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
    pub exit_code: i32,
}

#[derive(Serialize)]
struct JsonEnvelope<'a> {
    status: CommandStatus,
    command: &'a str,
    message: &'a str,
    details: &'a Value,
}

pub fn emit(quiet: bool, json: bool, outcome: &CommandOutcome) {
    if json {
        let envelope = JsonEnvelope {
            status: outcome.status,
            command: outcome.name,
            message: &outcome.message,
            details: &outcome.details,
        };
        if let Ok(rendered) = serde_json::to_string_pretty(&envelope) {
            println!("{rendered}");
        }
        return;
    }
    if quiet {
        if outcome.status != CommandStatus::Ok {
            eprintln!("dht {}: {}", outcome.name, outcome.message);
        }
        return;
    }
    match outcome.status {
        CommandStatus::Ok => println!("dht {}: {}", outcome.name, outcome.message),
        CommandStatus::UserError | CommandStatus::Failure => {
            eprintln!("dht {}: {}", outcome.name, outcome.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_envelope_round_trips_through_serde() {
        let outcome = CommandOutcome {
            name: "validate",
            status: CommandStatus::Ok,
            message: "clean".to_string(),
            details: serde_json::json!({"drift": 0}),
            exit_code: 0,
        };
        let envelope = JsonEnvelope {
            status: outcome.status,
            command: outcome.name,
            message: &outcome.message,
            details: &outcome.details,
        };
        let rendered = serde_json::to_string(&envelope).unwrap();
        assert!(rendered.contains("\"status\":\"ok\""));
        assert!(rendered.contains("\"drift\":0"));
    }
}
