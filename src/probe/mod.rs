//! Probe execution: command specs, the client seam and the retrying executor.

pub mod client;
pub mod commands;
pub mod executor;
pub mod types;

pub use client::{CommandProbeClient, ProbeClient};
pub use executor::{assess_payload, ProbeExecutor, RejectReason, Sleeper, ThreadSleeper};
pub use types::{CommandSpec, ProbeKind, ProbeOutput, ProbeResult, ProbeStatus, RetryPolicy};
