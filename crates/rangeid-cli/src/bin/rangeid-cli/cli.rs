//! CLI argument parsing and command dispatch.
//!
//! Uses clap derive macros for declarative argument definition with
//! support for environment variables and global options.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use rangeid_coordination::ServiceConfig;

use crate::commands::allocate::AllocateArgs;
use crate::commands::doc::DocCommand;
use crate::commands::ranges::RangesCommand;
use crate::commands::ratelimit::RateLimitCommand;
use crate::commands::simulate::SimulateArgs;
use crate::workspace::Workspace;

/// Holder identity used when neither the config nor the flags name one, so
/// locks taken in one run can be released in the next.
const DEFAULT_CLI_HOLDER: &str = "rangeid-cli";

/// Command-line interface for range-based id allocation.
#[derive(Parser)]
#[command(name = "rangeid-cli")]
#[command(version)]
#[command(about = "Allocate unique ids from shared ranges backed by versioned documents")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options available to all commands.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// JSON file holding the document store between runs.
    ///
    /// Without it every run starts from an empty store.
    #[arg(long, env = "RANGEID_STATE", global = true)]
    pub state: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, env = "RANGEID_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Lease holder identity of this client.
    #[arg(long, global = true)]
    pub holder: Option<String>,

    /// Wall-clock budget for one optimistic update, in milliseconds.
    #[arg(long = "timeout", global = true)]
    pub timeout_ms: Option<u64>,

    /// Output JSON instead of human-readable format.
    #[arg(long = "json", global = true)]
    pub is_json: bool,

    /// Enable verbose logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub is_verbose: bool,

    /// Suppress all logging output.
    #[arg(short = 'q', long = "quiet", global = true)]
    pub is_quiet: bool,
}

/// Top-level command categories.
#[derive(Subcommand)]
pub enum Commands {
    /// Claim (or preview) the next id for an owner's category.
    Allocate(AllocateArgs),

    /// Read, delete, lock and unlock documents.
    #[command(subcommand)]
    Doc(DocCommand),

    /// Validate range lists.
    #[command(subcommand)]
    Ranges(RangesCommand),

    /// Run concurrent allocators against a scratch store and check uniqueness.
    Simulate(SimulateArgs),

    /// Exercise the admission rate limiter.
    #[command(subcommand)]
    Ratelimit(RateLimitCommand),
}

impl GlobalOptions {
    /// Defaults, then the config file, then `RANGEID_*` variables, then flags.
    pub fn load_config(&self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::default();
        if let Some(path) = &self.config {
            config.merge(ServiceConfig::from_toml_file(path).context("failed to load configuration")?);
        }
        config.merge(ServiceConfig::from_env());
        if let Some(holder) = &self.holder {
            config.holder_id = Some(holder.clone());
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.update_timeout_ms = timeout_ms;
        }
        if config.holder_id.is_none() {
            config.holder_id = Some(DEFAULT_CLI_HOLDER.to_string());
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Open the state file with the layered configuration.
    fn open_workspace(&self) -> Result<Workspace> {
        Workspace::open(self.state.clone(), self.load_config()?)
    }
}

impl Cli {
    /// Execute the CLI command.
    pub async fn run(self) -> Result<()> {
        let json = self.global.is_json;

        match self.command {
            Commands::Ranges(cmd) => cmd.run(json),
            Commands::Ratelimit(cmd) => cmd.run(&self.global.load_config()?, json),
            Commands::Simulate(args) => args.run(&self.global.load_config()?, json).await,
            Commands::Allocate(args) => {
                let workspace = self.global.open_workspace()?;
                let result = args.run(&workspace, json).await;
                workspace.save()?;
                result
            }
            Commands::Doc(cmd) => {
                let workspace = self.global.open_workspace()?;
                let result = cmd.run(&workspace, json).await;
                workspace.save()?;
                result
            }
        }
    }
}
