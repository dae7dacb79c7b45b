//! Concurrent allocation simulation.
//!
//! Spawns one service per simulated client against a shared scratch store,
//! each with its own holder identity, and checks that every committed id is
//! unique and recorded.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use anyhow::ensure;
use clap::Args;
use rangeid_coordination::IdRange;
use rangeid_coordination::IdService;
use rangeid_coordination::ServiceConfig;
use rangeid_coordination::pure::normalize_ranges;
use rangeid_store::InMemoryDocumentStore;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::info;

use crate::output::Outputable;
use crate::output::print_output;

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of concurrent clients.
    #[arg(long, default_value = "15")]
    pub clients: u32,

    /// Id range, `FROM-TO` or a single id. Repeat for several ranges.
    #[arg(long = "range", short = 'r', required = true)]
    pub ranges: Vec<IdRange>,

    /// Document key shared by all clients.
    #[arg(long, default_value = "simulation/ids.json")]
    pub key: String,

    /// Give client N the N-th id of the ranges as a required id.
    #[arg(long)]
    pub required_ids: bool,
}

/// Simulation output.
pub struct SimulationOutput {
    pub clients: u32,
    pub allocated: Vec<u64>,
    pub duplicates: Vec<u64>,
    pub exhausted: u32,
    pub failed: u32,
    pub recorded: usize,
}

impl SimulationOutput {
    /// Every allocated id is distinct and present in the stored document.
    pub fn is_consistent(&self) -> bool {
        self.duplicates.is_empty() && self.recorded == self.allocated.len()
    }
}

impl Outputable for SimulationOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "clients": self.clients,
            "allocated": self.allocated,
            "duplicates": self.duplicates,
            "exhausted": self.exhausted,
            "failed": self.failed,
            "recorded": self.recorded,
            "consistent": self.is_consistent()
        })
    }

    fn to_human(&self) -> String {
        format!(
            "Simulation\n\
             ==========\n\
             Clients:    {}\n\
             Allocated:  {}\n\
             Duplicates: {}\n\
             Exhausted:  {}\n\
             Failed:     {}\n\
             Recorded:   {}\n\
             Result:     {}",
            self.clients,
            self.allocated.len(),
            self.duplicates.len(),
            self.exhausted,
            self.failed,
            self.recorded,
            if self.is_consistent() { "consistent" } else { "INCONSISTENT" }
        )
    }
}

impl SimulateArgs {
    pub async fn run(self, config: &ServiceConfig, json: bool) -> Result<()> {
        let output = simulate(config, &self).await?;
        print_output(&output, json);
        ensure!(
            output.is_consistent(),
            "simulation found {} duplicate ids and {} unrecorded allocations",
            output.duplicates.len(),
            output.allocated.len().saturating_sub(output.recorded)
        );
        Ok(())
    }
}

enum ClientResult {
    Allocated(u64),
    Exhausted,
    Failed,
}

async fn simulate(config: &ServiceConfig, args: &SimulateArgs) -> Result<SimulationOutput> {
    let ranges = normalize_ranges(&args.ranges)?;
    let store = InMemoryDocumentStore::new();
    info!(clients = args.clients, key = %args.key, "starting allocation simulation");

    let mut tasks = JoinSet::new();
    for n in 0..args.clients {
        let mut client_config = config.clone();
        client_config.holder_id = Some(format!("sim-client-{n}"));
        let service = IdService::new(Arc::clone(&store), &client_config);
        let required_id = if args.required_ids { nth_id(&ranges, u64::from(n)) } else { None };
        let ranges = ranges.clone();
        let key = args.key.clone();

        tasks.spawn(async move {
            match service.allocate_next_id(&key, &ranges, true, required_id).await {
                Ok(allocation) if allocation.available => ClientResult::Allocated(allocation.id),
                Ok(_) => ClientResult::Exhausted,
                Err(error) => {
                    debug!(client = n, error = %error, "simulated allocation failed");
                    ClientResult::Failed
                }
            }
        });
    }

    let mut allocated = Vec::new();
    let mut exhausted = 0u32;
    let mut failed = 0u32;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            ClientResult::Allocated(id) => allocated.push(id),
            ClientResult::Exhausted => exhausted += 1,
            ClientResult::Failed => failed += 1,
        }
    }
    allocated.sort_unstable();

    let mut seen = BTreeSet::new();
    let duplicates: Vec<u64> = allocated.iter().copied().filter(|id| !seen.insert(*id)).collect();

    let reader = IdService::new(Arc::clone(&store), config);
    let recorded = reader
        .read_document(&args.key)
        .await?
        .and_then(|content| content.as_array().map(Vec::len))
        .unwrap_or(0);

    Ok(SimulationOutput {
        clients: args.clients,
        allocated,
        duplicates,
        exhausted,
        failed,
        recorded,
    })
}

/// The `n`-th distinct id (zero-based) across sorted ranges.
fn nth_id(ranges: &[IdRange], mut n: u64) -> Option<u64> {
    let mut floor = 0u64;
    for range in ranges {
        let from = range.from.max(floor);
        if from > range.to {
            continue;
        }
        let len = IdRange::new(from, range.to).len();
        if n < len {
            return Some(from + n);
        }
        n -= len;
        floor = range.to.checked_add(1)?;
    }
    None
}
