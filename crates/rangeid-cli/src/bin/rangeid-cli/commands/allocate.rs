//! Id allocation command.

use anyhow::Result;
use clap::Args;
use rangeid_coordination::Allocation;
use rangeid_coordination::IdRange;
use rangeid_coordination::document_key;

use crate::output::Outputable;
use crate::output::print_output;
use crate::workspace::Workspace;

#[derive(Args)]
pub struct AllocateArgs {
    /// Owner of the allocation domain.
    pub owner: String,

    /// Category within the owner's domain.
    pub category: String,

    /// Id range, `FROM-TO` or a single id. Repeat for several ranges.
    #[arg(long = "range", short = 'r', required = true)]
    pub ranges: Vec<IdRange>,

    /// Claim this id instead of the first free one.
    #[arg(long)]
    pub id: Option<u64>,

    /// Report the result without recording it.
    #[arg(long)]
    pub dry_run: bool,

    /// Client identity checked against the rate limiter.
    #[arg(long)]
    pub client: Option<String>,
}

/// Allocation output.
pub struct AllocationOutput {
    pub key: String,
    pub allocation: Allocation,
}

impl Outputable for AllocationOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.key,
            "id": self.allocation.id,
            "available": self.allocation.available,
            "updated": self.allocation.updated,
            "was_already_consumed": self.allocation.was_already_consumed,
            "has_prior_consumption": self.allocation.has_prior_consumption
        })
    }

    fn to_human(&self) -> String {
        let allocation = &self.allocation;
        if allocation.was_already_consumed {
            format!("{}: id {} is already consumed", self.key, allocation.id)
        } else if !allocation.available {
            format!("{}: no ids left in the configured ranges", self.key)
        } else if allocation.updated {
            format!("{}: allocated {}", self.key, allocation.id)
        } else {
            format!("{}: next free id is {} (not recorded)", self.key, allocation.id)
        }
    }
}

impl AllocateArgs {
    pub async fn run(self, workspace: &Workspace, json: bool) -> Result<()> {
        let key = document_key(&self.owner, &self.category);
        let commit = !self.dry_run;
        let service = &workspace.service;

        let allocation = match &self.client {
            Some(client) => service.allocate_next_id_for(client, &key, &self.ranges, commit, self.id).await?,
            None => service.allocate_next_id(&key, &self.ranges, commit, self.id).await?,
        };

        print_output(&AllocationOutput { key, allocation }, json);
        Ok(())
    }
}
