//! Rate limiter commands.
//!
//! The limiter is process-local, so these commands replay a synthetic
//! request stream against a manual clock instead of waiting in real time.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use clap::Subcommand;
use rangeid_coordination::RateLimitError;
use rangeid_coordination::RateLimiter;
use rangeid_coordination::ServiceConfig;
use rangeid_store::ManualClock;

use crate::output::Outputable;
use crate::output::print_output;

/// Rate limiter operations.
#[derive(Subcommand)]
pub enum RateLimitCommand {
    /// Send a burst of requests from one client and report admissions.
    Probe(ProbeArgs),
}

#[derive(Args)]
pub struct ProbeArgs {
    /// Client identity.
    #[arg(long, default_value = "127.0.0.1")]
    pub client: String,

    /// Number of requests to send.
    #[arg(long, default_value = "20")]
    pub requests: u32,

    /// Simulated time between requests, in milliseconds.
    #[arg(long = "interval", default_value = "50")]
    pub interval_ms: u64,
}

/// Probe output.
pub struct ProbeOutput {
    pub client: String,
    pub requests: u32,
    pub accepted: u32,
    pub throttled: u32,
    pub locked_out: u32,
    pub first_rejection: Option<u32>,
    pub last_retry_after_ms: Option<u64>,
}

impl Outputable for ProbeOutput {
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "client": self.client,
            "requests": self.requests,
            "accepted": self.accepted,
            "throttled": self.throttled,
            "locked_out": self.locked_out,
            "first_rejection": self.first_rejection,
            "last_retry_after_ms": self.last_retry_after_ms
        })
    }

    fn to_human(&self) -> String {
        let first = self.first_rejection.map(|n| format!("request #{}", n)).unwrap_or_else(|| "none".to_string());
        format!(
            "Rate Limit Probe\n\
             ================\n\
             Client:          {}\n\
             Requests:        {}\n\
             Accepted:        {}\n\
             Throttled:       {}\n\
             Locked out:      {}\n\
             First rejection: {}",
            self.client, self.requests, self.accepted, self.throttled, self.locked_out, first
        )
    }
}

impl RateLimitCommand {
    /// Execute the rate limit command.
    pub fn run(self, config: &ServiceConfig, json: bool) -> Result<()> {
        match self {
            RateLimitCommand::Probe(args) => {
                let output = probe(config, &args);
                print_output(&output, json);
                Ok(())
            }
        }
    }
}

fn probe(config: &ServiceConfig, args: &ProbeArgs) -> ProbeOutput {
    let clock = Arc::new(ManualClock::new(0));
    let limiter = RateLimiter::with_clock(config.rate_limit.clone(), clock.clone());

    let mut output = ProbeOutput {
        client: args.client.clone(),
        requests: args.requests,
        accepted: 0,
        throttled: 0,
        locked_out: 0,
        first_rejection: None,
        last_retry_after_ms: None,
    };

    for n in 1..=args.requests {
        match limiter.try_accept(&args.client) {
            Ok(()) => output.accepted += 1,
            Err(error) => {
                match error {
                    RateLimitError::Throttled { .. } => output.throttled += 1,
                    RateLimitError::LockedOut { .. } => output.locked_out += 1,
                }
                output.first_rejection.get_or_insert(n);
                output.last_retry_after_ms = Some(error.retry_after_ms());
            }
        }
        clock.advance_ms(args.interval_ms);
    }
    output
}
