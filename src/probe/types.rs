//! Core data types for probe execution.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of external measurement invoked by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Raw adapter/radio state dump
    InterfaceState,
    /// Routing table dump used to find the default gateway
    RouteTable,
    TcpDownload,
    TcpUpload,
    UdpDownload,
    UdpUpload,
    PingGateway,
    PingWan,
    /// Path discovery towards the measurement server
    TraceServer,
    /// Path discovery towards the generic WAN target
    TraceWan,
}

impl ProbeKind {
    /// Bandwidth probes in the order a run executes them
    pub const BANDWIDTH: [ProbeKind; 4] = [
        ProbeKind::TcpDownload,
        ProbeKind::TcpUpload,
        ProbeKind::UdpDownload,
        ProbeKind::UdpUpload,
    ];

    pub const LATENCY: [ProbeKind; 2] = [ProbeKind::PingGateway, ProbeKind::PingWan];

    pub const PATH: [ProbeKind; 2] = [ProbeKind::TraceServer, ProbeKind::TraceWan];

    /// Short tag used in artifact file names and table columns
    pub fn tag(&self) -> &'static str {
        match self {
            ProbeKind::InterfaceState => "wlan",
            ProbeKind::RouteTable => "route",
            ProbeKind::TcpDownload => "tcp_dl",
            ProbeKind::TcpUpload => "tcp_ul",
            ProbeKind::UdpDownload => "udp_dl",
            ProbeKind::UdpUpload => "udp_ul",
            ProbeKind::PingGateway => "ping_gw",
            ProbeKind::PingWan => "ping_wan",
            ProbeKind::TraceServer => "trace_server",
            ProbeKind::TraceWan => "trace_wan",
        }
    }

    pub fn from_tag(tag: &str) -> Option<ProbeKind> {
        [
            ProbeKind::InterfaceState,
            ProbeKind::RouteTable,
            ProbeKind::TcpDownload,
            ProbeKind::TcpUpload,
            ProbeKind::UdpDownload,
            ProbeKind::UdpUpload,
            ProbeKind::PingGateway,
            ProbeKind::PingWan,
            ProbeKind::TraceServer,
            ProbeKind::TraceWan,
        ]
        .into_iter()
        .find(|k| k.tag() == tag)
    }

    pub fn is_bandwidth(&self) -> bool {
        Self::BANDWIDTH.contains(self)
    }

    pub fn is_latency(&self) -> bool {
        Self::LATENCY.contains(self)
    }

    pub fn is_path(&self) -> bool {
        Self::PATH.contains(self)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A fully specified external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub kind: ProbeKind,
    pub program: String,
    pub args: Vec<String>,
    /// Substrings that mark a payload as a tool-reported failure
    #[serde(default)]
    pub error_markers: Vec<String>,
    /// Prepend stderr to the payload (traceroute prints its header there)
    #[serde(default)]
    pub capture_stderr: bool,
}

impl CommandSpec {
    pub fn new(kind: ProbeKind, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            error_markers: Vec::new(),
            capture_stderr: false,
        }
    }

    pub fn with_stderr(mut self) -> Self {
        self.capture_stderr = true;
        self
    }

    pub fn with_error_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.error_markers = markers.into_iter().map(Into::into).collect();
        self
    }

    /// Command identity as a single shell-like line
    pub fn identity(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Raw output of a single invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Exit code; `None` when the process was killed or never exited
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProbeOutput {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }
}

/// Outcome of running a command under the retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub kind: ProbeKind,
    pub command: String,
    pub exit_status: Option<i32>,
    /// Accepted payload, or the last attempt's payload when `failed`
    pub payload: Vec<u8>,
    pub attempts: u32,
    pub elapsed: Duration,
    /// Set when every attempt was rejected
    pub failed: bool,
    /// Final artifact path, when the executor was asked to persist one
    pub artifact: Option<PathBuf>,
}

impl ProbeResult {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub fn status(&self) -> ProbeStatus {
        if self.failed {
            ProbeStatus::Failed { attempts: self.attempts }
        } else {
            ProbeStatus::Ok { attempts: self.attempts }
        }
    }
}

/// Per-probe status recorded in run metadata and the run table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeStatus {
    Ok { attempts: u32 },
    /// Retries exhausted; the last payload may still carry partial data
    Failed { attempts: u32 },
    /// The probe could not be issued at all (e.g. no gateway to ping)
    Skipped,
}

impl ProbeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeStatus::Ok { .. } => "ok",
            ProbeStatus::Failed { .. } => "failed",
            ProbeStatus::Skipped => "skipped",
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProbeStatus::Ok { attempts } | ProbeStatus::Failed { attempts } => *attempts,
            ProbeStatus::Skipped => 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeStatus::Ok { .. })
    }
}

/// Retry policy with capped exponential backoff and uniform jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub cap: Duration,
    /// Upper bound (exclusive) of the uniform jitter added to each delay
    #[serde(with = "humantime_serde")]
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            cap: Duration::from_secs(16),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the delay after a rejected attempt (1-based):
    /// `min(cap, base * 2^(attempt-1))`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_sequence_is_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=8).map(|a| policy.backoff(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 16, 16, 16]);
    }

    #[test]
    fn test_backoff_large_attempt_does_not_overflow() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(200), Duration::from_secs(16));
    }

    #[test]
    fn test_tag_roundtrip() {
        for kind in ProbeKind::BANDWIDTH.iter().chain(&ProbeKind::LATENCY).chain(&ProbeKind::PATH) {
            assert_eq!(ProbeKind::from_tag(kind.tag()), Some(*kind));
        }
        assert_eq!(ProbeKind::from_tag("nope"), None);
    }

    #[test]
    fn test_command_identity() {
        let spec = CommandSpec::new(
            ProbeKind::PingWan,
            "ping",
            vec!["-c".to_string(), "50".to_string(), "8.8.8.8".to_string()],
        );
        assert_eq!(spec.identity(), "ping -c 50 8.8.8.8");
    }

    #[test]
    fn test_retry_policy_from_yaml() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 3\ncap: 4s\n").unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.cap, Duration::from_secs(4));
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }
}
