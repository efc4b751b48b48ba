//! Summary statistics over ordered sample series.
//!
//! Throughput intervals and round-trip samples both end up here: a
//! [`SampleSeries`] keeps the original temporal order (needed for jitter)
//! and the number of samples that were requested (needed for loss).

pub mod series;

pub use series::{percentile_nearest_rank, summarize, Sample, SampleSeries, StatSummary};
