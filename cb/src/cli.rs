//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// ComponentBridge - host/component messaging bridge
#[derive(Parser)]
#[command(
    name = "cb",
    about = "Message-correlation bridge between a sandboxed component and its host",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one session over stdin/stdout
    ///
    /// Stdin carries JSON lines of script events, stdout carries posted frames.
    Bridge,

    /// Replay a script deterministically under a simulated clock
    Replay {
        /// JSON-lines script file
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Print session metrics after the replay
        #[arg(short, long)]
        summary: bool,
    },
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    let path = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("componentbridge")
        .join("logs")
        .join("componentbridge.log");
    debug!(?path, "get_log_path: returning path");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_replay() {
        let cli = Cli::parse_from(["cb", "-l", "debug", "replay", "run.jsonl", "--summary"]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Replay { script, summary } => {
                assert_eq!(script, PathBuf::from("run.jsonl"));
                assert!(summary);
            }
            other => panic!("Wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_log_path_location() {
        let path = get_log_path();
        assert!(path.ends_with("componentbridge/logs/componentbridge.log"));
    }
}
