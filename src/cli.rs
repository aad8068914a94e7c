use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "giga")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Apply a declarative manifest to many targets in parallel", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a manifest to every target
    Apply(RunArgs),

    /// Undo a manifest on every target
    Delete(DeleteArgs),

    /// Report whether every target is converged
    Check(RunArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Inspect giga settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

// ============================================================================
// Run Commands
// ============================================================================

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Manifest file (TOML)
    pub manifest: PathBuf,

    /// Target directory; repeat to replace the manifest's targets
    #[arg(short, long = "target", value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Number of parallel workers (default: one per target)
    #[arg(short, long, env = "GIGA_JOBS")]
    pub jobs: Option<usize>,

    /// Synchronize workers at every task
    #[arg(long)]
    pub sync: bool,

    /// Stop coordinating as soon as one target fails
    #[arg(long)]
    pub fail_early: bool,

    /// Print a JSON report instead of the table
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Show the settings file location and effective settings
    Show,

    /// Print the settings file path
    Path,
}
