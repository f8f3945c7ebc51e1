//! Command-line interface for the Genie daemon

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Genie - personal task assistant
#[derive(Debug, Parser)]
#[command(name = "genied", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a config file (.genie.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process one natural-language utterance
    Utter {
        /// User identifier
        #[arg(short, long, default_value = "default_user")]
        user: String,

        /// The utterance text
        text: String,
    },

    /// List tasks, ordered by creation time
    Tasks {
        #[arg(short, long, default_value = "default_user")]
        user: String,

        /// Filter by status (pending | in_progress | done | cancelled)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Show the current recommendation
    Next {
        #[arg(short, long, default_value = "default_user")]
        user: String,
    },

    /// Record feedback about completed work
    Feedback {
        #[arg(short, long, default_value = "default_user")]
        user: String,

        /// Feedback kind (task_completion | scheduling | difficulty | energy)
        #[arg(short, long)]
        kind: String,

        /// Referenced task id
        #[arg(long)]
        task: Option<String>,

        /// Referenced subtask id
        #[arg(long)]
        subtask: Option<String>,

        /// Minutes actually spent
        #[arg(long)]
        actual_minutes: Option<u32>,

        /// Perceived difficulty, 1-10
        #[arg(long)]
        difficulty: Option<u8>,

        /// Energy level, 1-10
        #[arg(long)]
        energy: Option<u8>,
    },

    /// Show the derived analytics view
    Analytics {
        #[arg(short, long, default_value = "default_user")]
        user: String,
    },

    /// Report component health
    Health,

    /// Manage store backups
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Export one user's data to a file
    Export {
        #[arg(short, long, default_value = "default_user")]
        user: String,

        /// Output path
        path: PathBuf,
    },

    /// Import a previously exported user payload
    Import {
        /// Input path
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
pub enum BackupCommand {
    /// Create a backup now
    Create {
        /// Reason recorded in the backup filename
        #[arg(default_value = "manual")]
        reason: String,
    },

    /// List available backups, newest first
    List,

    /// Restore the store from a named backup
    Restore {
        /// Backup filename
        name: String,
    },
}
