//! Command line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "herald",
    version,
    about = "Relay one notification to every configured push, chat and mail service"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Report format on stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty, global = true)]
    pub output: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Also write logs to a daily-rolling file in this directory
    #[arg(long, env = "LOG_DIR", global = true)]
    pub log_dir: Option<PathBuf>,

    /// Exit with code 2 when any channel failed
    #[arg(long, global = true)]
    pub strict: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a notification built from arguments
    Send {
        /// Notification title
        #[arg(short, long)]
        title: String,

        /// Notification body
        #[arg(short, long, default_value = "")]
        content: String,

        /// Free-form origin tag
        #[arg(short, long)]
        source: Option<String>,

        /// Attach a file (repeatable)
        #[arg(short, long = "attach", value_name = "PATH")]
        attachments: Vec<PathBuf>,
    },

    /// Dispatch a repository_dispatch event file
    Event {
        /// Event JSON file; defaults to GITHUB_EVENT_PATH
        #[arg(env = "GITHUB_EVENT_PATH")]
        path: Option<PathBuf>,
    },

    /// Show channel and configuration status
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable
    Pretty,
    /// Pretty-printed JSON
    Json,
}
