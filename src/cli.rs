use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "torque-deck",
    version,
    about = "A terminal workbench for Torque profiles, blueprints and environments."
)]
pub struct CliArgs {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Backend executable to run instead of the configured one
    #[arg(long)]
    pub backend: Option<String>,

    /// Seconds to wait before refreshing environments after one is ended (0 refreshes at once)
    #[arg(long)]
    pub refresh_delay_secs: Option<u64>,

    /// Keep settings in memory only
    #[arg(long)]
    pub ephemeral: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Append logs to this file; logs are discarded otherwise
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
