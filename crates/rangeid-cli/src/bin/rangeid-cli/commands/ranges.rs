//! Range validation commands.

use anyhow::Result;
use anyhow::ensure;
use clap::Args;
use clap::Subcommand;
use rangeid_coordination::IdRange;
use rangeid_coordination::pure::count_available;
use rangeid_coordination::pure::normalize_ranges;

use crate::output::Outputable;
use crate::output::print_output;

/// Range list operations.
#[derive(Subcommand)]
pub enum RangesCommand {
    /// Validate a range list and show it sorted.
    Check(CheckArgs),
}

#[derive(Args)]
pub struct CheckArgs {
    /// Ranges as `FROM-TO` or single ids.
    ///
    /// Parsed as text so that malformed bounds are reported rather than
    /// rejected by argument parsing.
    #[arg(required = true)]
    pub ranges: Vec<String>,

    /// Ids already consumed, to report how many remain.
    #[arg(long, value_delimiter = ',')]
    pub consumed: Vec<u64>,
}

/// Range check output.
pub struct RangeCheckOutput {
    pub valid: bool,
    pub ranges: Vec<IdRange>,
    pub total_ids: u64,
    pub remaining_ids: u64,
    pub error: Option<String>,
}

impl Outputable for RangeCheckOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.valid,
            "ranges": self.ranges.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "total_ids": self.total_ids,
            "remaining_ids": self.remaining_ids,
            "error": self.error
        })
    }

    fn to_human(&self) -> String {
        match &self.error {
            Some(error) => format!("Invalid: {}", error),
            None => {
                let ranges = self.ranges.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                format!("Valid: {}\nIds: {} total, {} remaining", ranges, self.total_ids, self.remaining_ids)
            }
        }
    }
}

impl RangesCommand {
    pub fn run(self, json: bool) -> Result<()> {
        match self {
            RangesCommand::Check(args) => {
                let output = check_ranges(&args.ranges, &args.consumed);
                print_output(&output, json);
                ensure!(output.valid, "range check failed");
                Ok(())
            }
        }
    }
}

fn check_ranges(raw: &[String], consumed: &[u64]) -> RangeCheckOutput {
    let checked = raw
        .iter()
        .map(|text| text.parse::<IdRange>())
        .collect::<Result<Vec<_>, _>>()
        .and_then(|ranges| normalize_ranges(&ranges));

    match checked {
        Ok(ranges) => RangeCheckOutput {
            valid: true,
            total_ids: count_available(&ranges, &[]),
            remaining_ids: count_available(&ranges, consumed),
            ranges,
            error: None,
        },
        Err(error) => RangeCheckOutput {
            valid: false,
            ranges: Vec::new(),
            total_ids: 0,
            remaining_ids: 0,
            error: Some(error.to_string()),
        },
    }
}
