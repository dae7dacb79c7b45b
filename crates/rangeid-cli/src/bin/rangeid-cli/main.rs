//! rangeid CLI - allocate ids, inspect documents and probe admission control.
//!
//! Documents live in a local JSON state file that stands in for the remote
//! blob store, so allocations, locks and deletions persist across runs.
//!
//! # Usage
//!
//! ```bash
//! # Claim the next free id for alice's widgets
//! rangeid-cli --state ids.json allocate alice widgets --range 100-199 --range 500-599
//!
//! # See what would be claimed without writing
//! rangeid-cli --state ids.json allocate alice widgets --range 100-199 --dry-run
//!
//! # Lock a domain document for a migration
//! rangeid-cli --state ids.json --holder migrator doc lock alice/widgets.json
//!
//! # JSON output for scripting
//! rangeid-cli --state ids.json --json doc get alice/widgets.json | jq '.content'
//! ```

mod cli;
mod commands;
mod output;
mod workspace;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing subscriber with environment-based filtering.
///
/// - `quiet`: Suppress all logging output (for scripting)
/// - `verbose`: Enable debug-level logging
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.global.is_quiet, cli.global.is_verbose);

    cli.run().await
}
