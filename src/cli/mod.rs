//! CLI module for Relay
//!
//! Command-line interface definitions and handlers for the Relay orchestrator.
//!
//! # Commands
//!
//! - `run` - Execute one agent run through the full pipeline
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Run a goal against OpenAI, falling back per relay.toml
//! relay run --goal "Summarize the quarterly report" --provider openai -c relay.toml
//!
//! # Generate shell completions
//! relay completions bash > ~/.bash_completion.d/relay
//! ```

pub mod completions;
pub mod config;
pub mod output;
pub mod run;

pub use completions::handle_completions;
pub use config::handle_config_init;
pub use run::handle_run;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Relay - multi-provider AI request orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "relay",
    version,
    about = "Multi-provider AI request orchestrator with retries, fallbacks and decision traces"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one agent run and print its decision trace
    Run(RunArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Output format for `relay run`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// What the agent should do
    #[arg(short, long)]
    pub goal: String,

    /// Primary provider (e.g. openai, anthropic)
    #[arg(short, long)]
    pub provider: String,

    /// Model for the primary provider (defaults to routing.default_models)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Path to configuration file
    #[arg(short, long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Organization the run is billed to
    #[arg(long, default_value = "local")]
    pub org: String,

    /// Project the run belongs to
    #[arg(long, default_value = "default")]
    pub project: String,

    /// Approve low-confidence decisions without prompting
    #[arg(long)]
    pub auto_approve: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RELAY_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "relay.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
