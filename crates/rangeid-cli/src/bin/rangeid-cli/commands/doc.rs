//! Document commands.
//!
//! Plain reads and deletes plus advisory locking. Locks are leases held by
//! this client's holder identity (`--holder`), so the same identity must be
//! used to unlock.

use anyhow::Result;
use clap::Args;
use clap::Subcommand;
use rangeid_store::Clock;
use rangeid_store::SystemClock;

use crate::output::BoolOutput;
use crate::output::Outputable;
use crate::output::print_output;
use crate::workspace::Workspace;

/// Document operations.
#[derive(Subcommand)]
pub enum DocCommand {
    /// Print a document's content.
    Get(KeyArgs),

    /// Delete a document. Refused while another holder has it locked.
    Delete(KeyArgs),

    /// Lock a document for this holder (renews an existing lock).
    Lock(KeyArgs),

    /// Release this holder's lock.
    Unlock(KeyArgs),

    /// List stored documents and their locks.
    List,
}

#[derive(Args)]
pub struct KeyArgs {
    /// Document key, e.g. `alice/widgets.json`.
    pub key: String,
}

/// Document content output.
pub struct DocumentOutput {
    pub key: String,
    pub content: Option<serde_json::Value>,
}

impl Outputable for DocumentOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "key": self.key,
            "exists": self.content.is_some(),
            "content": self.content
        })
    }

    fn to_human(&self) -> String {
        match &self.content {
            Some(content) => serde_json::to_string_pretty(content).unwrap_or_else(|_| content.to_string()),
            None => format!("{}: not found", self.key),
        }
    }
}

/// One row of the document listing.
pub struct DocumentEntry {
    pub key: String,
    pub lock_holder: Option<String>,
    pub lock_remaining_ms: Option<u64>,
}

/// Document listing output.
pub struct DocumentListOutput {
    pub entries: Vec<DocumentEntry>,
}

impl Outputable for DocumentListOutput {
    fn to_json(&self) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "key": entry.key,
                    "lock_holder": entry.lock_holder,
                    "lock_remaining_ms": entry.lock_remaining_ms
                })
            })
            .collect();
        serde_json::json!({ "documents": entries })
    }

    fn to_human(&self) -> String {
        if self.entries.is_empty() {
            return "No documents".to_string();
        }
        self.entries
            .iter()
            .map(|entry| match (&entry.lock_holder, entry.lock_remaining_ms) {
                (Some(holder), Some(remaining)) => {
                    format!("{}  (locked by {}, {}ms left)", entry.key, holder, remaining)
                }
                _ => entry.key.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DocCommand {
    /// Execute the document command.
    pub async fn run(self, workspace: &Workspace, json: bool) -> Result<()> {
        let service = &workspace.service;
        match self {
            DocCommand::Get(args) => {
                let content = service.read_document(&args.key).await?;
                print_output(&DocumentOutput { key: args.key, content }, json);
            }
            DocCommand::Delete(args) => {
                let success = service.delete_document(&args.key).await;
                print_bool("delete", args.key, success, json);
            }
            DocCommand::Lock(args) => {
                let success = service.lock_document(&args.key).await;
                print_bool("lock", args.key, success, json);
            }
            DocCommand::Unlock(args) => {
                let success = service.unlock_document(&args.key).await;
                print_bool("unlock", args.key, success, json);
            }
            DocCommand::List => {
                let now_ms = SystemClock.now_unix_ms();
                let entries = workspace
                    .store
                    .keys()
                    .into_iter()
                    .map(|key| {
                        let lease = workspace.store.lease(&key);
                        DocumentEntry {
                            lock_holder: lease.as_ref().map(|lease| lease.holder.to_string()),
                            lock_remaining_ms: lease.as_ref().map(|lease| lease.remaining_ms(now_ms)),
                            key,
                        }
                    })
                    .collect();
                print_output(&DocumentListOutput { entries }, json);
            }
        }
        Ok(())
    }
}

fn print_bool(operation: &'static str, key: String, success: bool, json: bool) {
    print_output(&BoolOutput { operation, key, success }, json);
}
