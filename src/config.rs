use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Sidecar settings. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "campusd")]
#[command(about = "Dataset backup, restore and reset sidecar for the campus admin app")]
pub struct Config {
    /// Workspace directory to open at startup
    #[arg(long, env = "CAMPUSD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Institution name, embedded in snapshot file names
    #[arg(long, env = "CAMPUSD_INSTITUTION", default_value = "Institution")]
    pub institution: String,

    #[arg(long, env = "CAMPUSD_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Default tracing filter when RUST_LOG is unset
    #[arg(long, env = "CAMPUSD_LOG", default_value = "campusd=info")]
    pub log_filter: String,
}
