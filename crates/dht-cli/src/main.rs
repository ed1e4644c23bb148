#![deny(clippy::all, warnings)]

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use dht_core::config::GlobalOptions;
use dht_core::effects::SystemEffects;
use dht_core::CommandContext;

mod cli;
mod dispatch;
mod output;

use cli::DhtCli;
use dispatch::dispatch_command;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = DhtCli::parse();
    init_tracing(cli.verbose);

    let global = GlobalOptions {
        quiet: cli.quiet,
        verbose: cli.verbose,
        json: cli.json,
        strict: cli.strict,
        config: cli.config.clone(),
    };

    let ctx = CommandContext::new(&global, Arc::new(SystemEffects::new())).map_err(|err| eyre!("{err:?}"))?;
    let outcome = dispatch_command(&ctx, &cli.command);
    output::emit(cli.quiet, cli.json, &outcome);

    if outcome.exit_code == 0 {
        Ok(())
    } else {
        std::process::exit(outcome.exit_code);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = format!("dht={level},dht_core={level},dht_domain={level}");
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
