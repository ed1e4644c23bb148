//! Maps one parsed [`crate::cli::DhtCommand`] to its `dht_core::api` entry
//! point and flattens the result into a [`CommandOutcome`], generalized
//! from the teacher's `px-cli::dispatch` (`px-cli/src/dispatch.rs`).

use dht_core::api;
use dht_core::CommandContext;
use dht_domain::DhtError;

use crate::cli::DhtCommand;
use crate::output::{CommandOutcome, CommandStatus};

pub fn dispatch_command(ctx: &CommandContext<'_>, command: &DhtCommand) -> CommandOutcome {
    match command {
        DhtCommand::Setup => from_result("setup", api::setup(ctx).map(|manifest| {
            serde_json::json!({
                "schema_version": manifest.schema_version,
                "interpreter_version": manifest.interpreter_version,
                "capabilities": manifest.capabilities,
            })
        })),
        DhtCommand::Regenerate { task_id } => from_result("regenerate", api::regenerate(ctx, task_id).map(|outcome| {
            serde_json::json!({
                "fingerprint": outcome.fingerprint.0,
                "steps": outcome.steps.iter().map(|s| s.step.name()).collect::<Vec<_>>(),
                "resumed_from_step": outcome.resumed_from_step,
            })
        })),
        DhtCommand::Validate => validation_outcome("validate", api::validate(ctx)),
        DhtCommand::Fix => validation_outcome("fix", api::fix(ctx)),
        DhtCommand::Clean => from_result("clean", api::clean(ctx).map(|()| serde_json::Value::Null)),
        DhtCommand::Run { program, args } => from_result("run", api::run(ctx, program, args).map(|output| {
            serde_json::json!({"code": output.code, "stdout": output.stdout, "stderr": output.stderr})
        })),
    }
}

fn validation_outcome(
    name: &'static str,
    result: anyhow::Result<dht_core::validator::ValidationReport>,
) -> CommandOutcome {
    match result {
        Ok(report) if report.diff.is_clean() => CommandOutcome {
            name,
            status: CommandStatus::Ok,
            message: "no drift detected".to_string(),
            details: serde_json::json!({"clean": true, "entries": []}),
            exit_code: 0,
        },
        Ok(report) => CommandOutcome {
            name,
            status: CommandStatus::UserError,
            message: format!("{} drift entries found", report.diff.entries.len()),
            details: serde_json::json!({"clean": false, "entries": report.diff.entries.len()}),
            exit_code: DhtError::FingerprintDrift { diff_entries: report.diff.entries.len() }.exit_code(),
        },
        Err(err) => from_error(name, err),
    }
}

fn from_result(name: &'static str, result: anyhow::Result<serde_json::Value>) -> CommandOutcome {
    match result {
        Ok(details) => CommandOutcome { name, status: CommandStatus::Ok, message: "ok".to_string(), details, exit_code: 0 },
        Err(err) => from_error(name, err),
    }
}

fn from_error(name: &'static str, err: anyhow::Error) -> CommandOutcome {
    let exit_code = err.downcast_ref::<DhtError>().map_or(4, DhtError::exit_code);
    let status = if exit_code == 2 { CommandStatus::UserError } else { CommandStatus::Failure };
    CommandOutcome {
        name,
        status,
        message: format!("{err:#}"),
        details: serde_json::Value::Null,
        exit_code,
    }
}
