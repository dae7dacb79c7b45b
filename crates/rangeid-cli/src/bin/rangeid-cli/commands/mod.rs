//! Command modules for rangeid-cli.
//!
//! Each module handles a category of operations.

pub mod allocate;
pub mod doc;
pub mod ranges;
pub mod ratelimit;
pub mod simulate;
