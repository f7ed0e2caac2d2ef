// src/cli.rs
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tracks progress through a cyclic weekly workout plan", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// User to act as (defaults to default_user from the config file)
    #[arg(long, short = 'u', global = true)]
    pub user: Option<String>,

    /// Print tables as CSV instead
    #[arg(long, global = true)]
    pub export_csv: bool,

    /// Log engine decisions to stderr
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import a TOML plan file and assign it to the user
    ImportPlan {
        /// Path to the plan file
        file: PathBuf,
    },
    /// Assign an already imported workout to the user
    Assign {
        workout_id: String,
    },
    /// Show the sets of the current day, creating the day sheet if needed
    Status,
    /// Record partial progress on a set (absolute value, not an increment)
    Progress {
        set_id: String,
        /// Repetitions done so far
        #[arg(short, long, conflicts_with = "duration")]
        reps: Option<i64>,
        /// Seconds done so far
        #[arg(short, long)]
        duration: Option<i64>,
    },
    /// Mark one or more sets of the current day as complete
    Complete {
        #[arg(required = true, num_args = 1..)]
        set_ids: Vec<String>,
        /// Submit all completions at once from separate threads
        #[arg(long)]
        parallel: bool,
        /// History entry the sets belong to (defaults to the current one)
        #[arg(long)]
        entry: Option<i64>,
    },
    /// List past and current day sheets
    History,
    /// Remember a user as the default for later commands
    SetDefaultUser {
        user_id: String,
    },
    /// Show the path of the database file
    DbPath,
    /// Show the path of the config file
    ConfigPath,
    /// Generate shell completion scripts
    GenerateCompletion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// Function to parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
