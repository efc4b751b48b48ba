//! Ping text artifacts.

use std::sync::LazyLock;

use regex::Regex;

use crate::stats::{Sample, SampleSeries};

/// Compiled patterns for ping output
pub struct PingPatterns {
    /// Match: "time=12.3 ms", "time=12.3ms", "time<1ms"
    pub rtt: Regex,
    /// Match: "Request timeout", "Request timed out", "no answer yet",
    /// "Destination Host Unreachable"
    pub failure: Regex,
    /// Match: "50 packets transmitted" (unix) or "Sent = 50" (windows)
    pub transmitted: Regex,
}

impl PingPatterns {
    pub fn new() -> Self {
        Self {
            rtt: Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]*)?)\s?ms")
                .expect("Invalid rtt regex"),
            failure: Regex::new(
                r"(?i)request timeout|request timed out|no answer yet|destination host unreachable",
            )
            .expect("Invalid failure regex"),
            transmitted: Regex::new(r"(?i)(\d+) packets transmitted|Sent = (\d+)")
                .expect("Invalid transmitted regex"),
        }
    }
}

impl Default for PingPatterns {
    fn default() -> Self {
        Self::new()
    }
}

pub static PING_PATTERNS: LazyLock<PingPatterns> = LazyLock::new(PingPatterns::new);

/// Round-trip time in ms from one reply line
pub fn extract_rtt_ms(line: &str) -> Option<f64> {
    PING_PATTERNS
        .rtt
        .captures(line)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Transmitted packet count from the tool's summary
pub fn extract_transmitted(text: &str) -> Option<usize> {
    let caps = PING_PATTERNS.transmitted.captures(text)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

/// Parse ping output into an ordered series.
///
/// Reply lines become present samples, explicit failure lines become gaps
/// at their position. The requested total is the largest of `requested`,
/// the tool's transmitted count and the number of sample lines, so silently
/// dropped replies still count as loss.
pub fn parse_latency(text: &str, requested: usize) -> SampleSeries {
    let mut samples = Vec::new();

    for line in text.lines() {
        let offset = samples.len() as f64;
        if let Some(rtt) = extract_rtt_ms(line) {
            samples.push(Sample::present(offset, rtt));
        } else if PING_PATTERNS.failure.is_match(line) {
            samples.push(Sample::missing(offset));
        }
    }

    let transmitted = extract_transmitted(text).unwrap_or(0);
    let total = requested.max(transmitted).max(samples.len());

    SampleSeries::with_requested(samples, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::summarize;

    const MACOS: &str = "\
PING 192.168.1.1 (192.168.1.1): 56 data bytes
64 bytes from 192.168.1.1: icmp_seq=0 ttl=64 time=2.812 ms
Request timeout for icmp_seq 1
64 bytes from 192.168.1.1: icmp_seq=2 ttl=64 time=3.188 ms

--- 192.168.1.1 ping statistics ---
3 packets transmitted, 2 packets received, 33.3% packet loss
round-trip min/avg/max/stddev = 2.812/3.000/3.188/0.188 ms
";

    const LINUX_SILENT_LOSS: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=117 time=20.1 ms
64 bytes from 8.8.8.8: icmp_seq=3 ttl=117 time=22.1 ms

--- 8.8.8.8 ping statistics ---
4 packets transmitted, 2 received, 50% packet loss, time 3004ms
rtt min/avg/max/mdev = 20.100/21.100/22.100/1.000 ms
";

    #[test]
    fn test_timeout_lines_are_gaps() {
        let series = parse_latency(MACOS, 0);
        assert_eq!(series.samples().len(), 3);
        assert_eq!(series.samples()[1].value, None);
        assert_eq!(series.present_values(), vec![2.812, 3.188]);
        assert_eq!(series.requested(), 3);
    }

    #[test]
    fn test_transmitted_count_catches_silent_loss() {
        let series = parse_latency(LINUX_SILENT_LOSS, 0);
        assert_eq!(series.present_count(), 2);
        assert_eq!(series.requested(), 4);
        assert_eq!(summarize(&series).loss_percent, 50.0);
    }

    #[test]
    fn test_requested_count_wins_when_larger() {
        let series = parse_latency(LINUX_SILENT_LOSS, 10);
        assert_eq!(series.requested(), 10);
        assert_eq!(summarize(&series).loss_percent, 80.0);
    }

    #[test]
    fn test_windows_output() {
        let text = "\
Reply from 10.0.0.1: bytes=32 time<1ms TTL=64
Reply from 10.0.0.1: bytes=32 time=4ms TTL=64
Request timed out.
    Packets: Sent = 3, Received = 2, Lost = 1 (33% loss),
";
        let series = parse_latency(text, 0);
        assert_eq!(series.present_values(), vec![1.0, 4.0]);
        assert_eq!(series.missing_count(), 1);
        assert_eq!(series.requested(), 3);
    }

    #[test]
    fn test_garbage_yields_full_loss() {
        let series = parse_latency("ping: sendto: No route to host\n", 5);
        let summary = summarize(&series);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.loss_percent, 100.0);
    }
}
