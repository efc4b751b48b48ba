//! Parsers for raw probe artifacts and the on-disk artifact layout.
//!
//! Every parser is tolerant: a missing field becomes `None` rather than an
//! error, and only a payload that cannot be read at all (non-JSON where JSON
//! is required, unreadable file) yields an [`ArtifactError`].

pub mod bandwidth;
pub mod latency;
pub mod layout;
pub mod path;
pub mod route;

use std::path::PathBuf;

pub use bandwidth::{parse_bandwidth, BandwidthSummary, Direction, Protocol};
pub use latency::parse_latency;
pub use layout::{ArtifactLayout, ProbeMeta, RunMeta};
pub use path::{parse_trace, Hop, Trace};
pub use route::extract_default_gateway;

/// Errors raised while reading artifacts
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Malformed {kind} artifact: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("Tool reported an error: {0}")]
    ToolError(String),

    #[error("Failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        ArtifactError::Malformed {
            kind,
            reason: reason.into(),
        }
    }
}
