use clap::{ArgAction, Parser, Subcommand};

pub const DHT_BEFORE_HELP: &str = concat!(
    "dht ",
    env!("CARGO_PKG_VERSION"),
    " - deterministic Python dev-environment regeneration\n\n",
    "  setup        Write a minimal .dhtconfig for the current project.\n",
    "  regenerate   Run the regeneration engine end to end.\n",
    "  validate     Report drift against the recorded fingerprint.\n",
    "  fix          Repair whatever validate found drifted.\n",
    "  clean        Remove the environment directory.\n",
    "  run           Execute a command inside the project environment.\n",
);

#[derive(Parser, Debug)]
#[command(name = "dht", author, version, disable_help_subcommand = true, before_help = DHT_BEFORE_HELP)]
pub struct DhtCli {
    #[arg(short, long, global = true, help = "Suppress human-readable output")]
    pub quiet: bool,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase logging (-vv reaches trace)")]
    pub verbose: u8,
    #[arg(long, global = true, help = "Emit one JSON object per event instead of human text")]
    pub json: bool,
    #[arg(long, global = true, help = "Treat capability fallback and drift as hard failures")]
    pub strict: bool,
    #[arg(long, global = true, help = "Path to an alternate .dhtconfig")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: DhtCommand,
}

#[derive(Subcommand, Debug)]
pub enum DhtCommand {
    /// Write a minimal `.dhtconfig` for the current project.
    Setup,
    /// Run the regeneration engine end to end, resuming from the last checkpoint.
    Regenerate {
        #[arg(long, default_value = "regenerate")]
        task_id: String,
    },
    /// Report drift against the manifest's recorded fingerprint, without mutating anything.
    Validate,
    /// Repair whatever `validate` found drifted.
    Fix,
    /// Remove the environment directory.
    Clean,
    /// Execute a command inside the project environment.
    Run {
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}
