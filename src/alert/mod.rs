//! Data health checks surfaced on the dashboard.
//!
//! Submodules:
//! - `staleness`: is the newest reading older than expected?

pub mod staleness;
