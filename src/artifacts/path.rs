//! Path-discovery (traceroute) artifacts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ArtifactError;

/// One position in a discovered path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub rtts_ms: Vec<f64>,
}

impl Hop {
    /// A hop that answered nothing (`* * *`)
    pub fn timeout(index: u32) -> Self {
        Self {
            index,
            hostname: None,
            address: None,
            rtts_ms: Vec::new(),
        }
    }

    /// Stable node identity: the address, else the hostname
    pub fn identity(&self) -> Option<&str> {
        self.address.as_deref().or(self.hostname.as_deref())
    }

    pub fn is_resolved(&self) -> bool {
        self.identity().is_some()
    }
}

/// Ordered hop list from one path-discovery run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Originating node; the topology builder substitutes the client id when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<String>,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

impl Trace {
    /// Destination identity: the resolved address, else the name given
    pub fn destination(&self) -> Option<&str> {
        self.target_address.as_deref().or(self.target.as_deref())
    }

    pub fn resolved_hops(&self) -> impl Iterator<Item = &Hop> {
        self.hops.iter().filter(|h| h.is_resolved())
    }
}

/// Compiled patterns for traceroute output
pub struct TracePatterns {
    /// Match: "traceroute to example.com (93.184.216.34), 30 hops max"
    pub header: Regex,
    /// Match: " 3  <rest of line>"
    pub hop_line: Regex,
    /// Match: "router.lan (192.168.1.1)"
    pub named_host: Regex,
    /// Match: "192.168.1.1" or an IPv6 literal at the start of the rest
    pub bare_address: Regex,
    /// Match: "1.234 ms"
    pub rtt: Regex,
}

impl TracePatterns {
    pub fn new() -> Self {
        Self {
            header: Regex::new(r"traceroute6? to ([^\s,()]+)(?:\s*\(([^)]+)\))?")
                .expect("Invalid header regex"),
            hop_line: Regex::new(r"^\s*(\d+)\s+(.*)$").expect("Invalid hop_line regex"),
            named_host: Regex::new(r"^([^\s()*]+)\s+\(([0-9A-Fa-f.:]+)\)")
                .expect("Invalid named_host regex"),
            bare_address: Regex::new(
                r"^(\d{1,3}(?:\.\d{1,3}){3}|[0-9A-Fa-f]{0,4}:[0-9A-Fa-f:]+)(?:\s|$)",
            )
            .expect("Invalid bare_address regex"),
            rtt: Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*ms").expect("Invalid rtt regex"),
        }
    }
}

impl Default for TracePatterns {
    fn default() -> Self {
        Self::new()
    }
}

pub static TRACE_PATTERNS: LazyLock<TracePatterns> = LazyLock::new(TracePatterns::new);

/// Parse one numbered hop line; `None` for anything else
pub fn parse_hop_line(line: &str) -> Option<Hop> {
    let caps = TRACE_PATTERNS.hop_line.captures(line)?;
    let index: u32 = caps.get(1)?.as_str().parse().ok()?;
    let rest = caps.get(2).map_or("", |m| m.as_str());

    // Leading stars are probes that timed out before a later one answered
    let body = rest.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
    if body.is_empty() {
        return Some(Hop::timeout(index));
    }

    let (hostname, address, tail) = if let Some(c) = TRACE_PATTERNS.named_host.captures(body) {
        let end = c.get(0).map_or(0, |m| m.end());
        (
            c.get(1).map(|m| m.as_str().to_string()),
            c.get(2).map(|m| m.as_str().to_string()),
            &body[end..],
        )
    } else if let Some(c) = TRACE_PATTERNS.bare_address.captures(body) {
        let m = c.get(1)?;
        (None, Some(m.as_str().to_string()), &body[m.end()..])
    } else {
        return Some(Hop::timeout(index));
    };

    let rtts_ms = TRACE_PATTERNS
        .rtt
        .captures_iter(tail)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect();

    Some(Hop {
        index,
        hostname,
        address,
        rtts_ms,
    })
}

/// Parse traceroute text, or a JSON [`Trace`] document.
pub fn parse_trace(text: &str) -> Result<Trace, ArtifactError> {
    if text.trim_start().starts_with('{') {
        return serde_json::from_str(text).map_err(|e| ArtifactError::malformed("path", e.to_string()));
    }

    let mut trace = Trace::default();
    for line in text.lines() {
        if trace.target.is_none() {
            if let Some(caps) = TRACE_PATTERNS.header.captures(line) {
                trace.target = caps.get(1).map(|m| m.as_str().to_string());
                trace.target_address = caps.get(2).map(|m| m.as_str().to_string());
                continue;
            }
        }
        if let Some(hop) = parse_hop_line(line) {
            trace.hops.push(hop);
        }
    }

    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "\
traceroute to iperf.example.net (203.0.113.5), 30 hops max, 60 byte packets
 1  gateway.lan (192.168.1.1)  1.512 ms  1.230 ms  1.101 ms
 2  * * *
 3  100.64.0.1  9.8 ms  10.2 ms *
 4  * be-10.core.comcast.net (68.86.1.1)  15.0 ms  14.0 ms
 5  iperf.example.net (203.0.113.5)  20.1 ms  20.3 ms  20.2 ms
";

    #[test]
    fn test_parse_text_trace() {
        let trace = parse_trace(TEXT).unwrap();
        assert_eq!(trace.target.as_deref(), Some("iperf.example.net"));
        assert_eq!(trace.destination(), Some("203.0.113.5"));
        assert_eq!(trace.hops.len(), 5);

        let gw = &trace.hops[0];
        assert_eq!(gw.hostname.as_deref(), Some("gateway.lan"));
        assert_eq!(gw.address.as_deref(), Some("192.168.1.1"));
        assert_eq!(gw.rtts_ms, vec![1.512, 1.230, 1.101]);

        assert!(!trace.hops[1].is_resolved());
        assert_eq!(trace.hops[1].index, 2);

        assert_eq!(trace.hops[2].hostname, None);
        assert_eq!(trace.hops[2].address.as_deref(), Some("100.64.0.1"));
        assert_eq!(trace.hops[2].rtts_ms, vec![9.8, 10.2]);

        assert_eq!(trace.hops[3].address.as_deref(), Some("68.86.1.1"));
        assert_eq!(trace.hops[3].rtts_ms, vec![15.0, 14.0]);
        assert_eq!(trace.resolved_hops().count(), 4);
    }

    #[test]
    fn test_header_without_address() {
        let trace = parse_trace("traceroute to 8.8.8.8, 30 hops max\n 1  * * *\n").unwrap();
        assert_eq!(trace.destination(), Some("8.8.8.8"));
        assert_eq!(trace.hops, vec![Hop::timeout(1)]);
    }

    #[test]
    fn test_parse_json_trace() {
        let json = r#"{"target": "8.8.8.8", "hops": [
            {"index": 1, "address": "192.168.1.1", "rtts_ms": [1.0, 2.0]},
            {"index": 2}
        ]}"#;
        let trace = parse_trace(json).unwrap();
        assert_eq!(trace.hops.len(), 2);
        assert_eq!(trace.hops[0].identity(), Some("192.168.1.1"));
        assert!(!trace.hops[1].is_resolved());
    }

    #[test]
    fn test_bad_json_is_malformed() {
        assert!(parse_trace("{ not json").is_err());
    }

    #[test]
    fn test_empty_text_has_no_hops() {
        let trace = parse_trace("").unwrap();
        assert!(trace.hops.is_empty());
        assert_eq!(trace.destination(), None);
    }
}
