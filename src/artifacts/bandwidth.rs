//! iperf3 `-J` bandwidth artifacts.

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ArtifactError;
use crate::stats::{summarize, Sample, SampleSeries, StatSummary};

const BITS_PER_MEGABIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Download = server sends (iperf3 `-R`), Upload = client sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

/// Terminal summary plus interval statistics of one bandwidth test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthSummary {
    pub protocol: Protocol,
    pub direction: Option<Direction>,
    /// Headline throughput: receiver, then sender, then `end.sum`
    pub mbps: Option<f64>,
    pub sender_mbps: Option<f64>,
    pub receiver_mbps: Option<f64>,
    pub jitter_ms: Option<f64>,
    pub loss_percent: Option<f64>,
    pub duration_s: Option<f64>,
    pub start_time: Option<String>,
    /// Top-level `error` reported by the tool alongside partial results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_error: Option<String>,
    /// Statistics over `intervals[].sum.bits_per_second` in Mbps
    pub interval_stats: StatSummary,
}

impl BandwidthSummary {
    pub fn p95_mbps(&self) -> Option<f64> {
        self.interval_stats.p95
    }
}

fn f64_at(value: &Value, pointer: &str) -> Option<f64> {
    value.pointer(pointer).and_then(Value::as_f64)
}

fn mbps_at(value: &Value, pointer: &str) -> Option<f64> {
    f64_at(value, pointer).map(|bps| bps / BITS_PER_MEGABIT)
}

/// Depth-first search for the first `bits_per_second` anywhere in the document
fn first_bits_per_second(value: &Value) -> Option<f64> {
    match value {
        Value::Object(map) => map
            .get("bits_per_second")
            .and_then(Value::as_f64)
            .or_else(|| map.values().find_map(first_bits_per_second)),
        Value::Array(items) => items.iter().find_map(first_bits_per_second),
        _ => None,
    }
}

/// Parse an iperf3 JSON report.
///
/// A report carrying a top-level `error` is still read: an interrupted test
/// keeps whatever it measured. Only when nothing at all was measured does
/// the tool error become [`ArtifactError::ToolError`].
pub fn parse_bandwidth(json_text: &str) -> Result<BandwidthSummary, ArtifactError> {
    let doc: Value = serde_json::from_str(json_text)
        .map_err(|e| ArtifactError::malformed("bandwidth", e.to_string()))?;

    if !doc.is_object() {
        return Err(ArtifactError::malformed("bandwidth", "top level is not an object"));
    }
    let tool_error = doc
        .get("error")
        .map(|err| err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string()));

    let end_sum = doc.pointer("/end/sum");
    let udp_markers = end_sum
        .map(|s| s.get("jitter_ms").is_some() || s.get("lost_percent").is_some())
        .unwrap_or(false);

    let protocol = match doc.pointer("/start/test_start/protocol").and_then(Value::as_str) {
        Some(p) if p.eq_ignore_ascii_case("udp") => Protocol::Udp,
        Some(_) => Protocol::Tcp,
        None if udp_markers => Protocol::Udp,
        None => Protocol::Tcp,
    };

    let direction = doc
        .pointer("/start/test_start/reverse")
        .and_then(Value::as_i64)
        .map(|r| if r == 1 { Direction::Download } else { Direction::Upload });

    let receiver_mbps = mbps_at(&doc, "/end/sum_received/bits_per_second");
    let sender_mbps = mbps_at(&doc, "/end/sum_sent/bits_per_second");
    let mbps = receiver_mbps
        .or(sender_mbps)
        .or_else(|| mbps_at(&doc, "/end/sum/bits_per_second"))
        .or_else(|| first_bits_per_second(&doc).map(|bps| bps / BITS_PER_MEGABIT));

    let (jitter_ms, loss_percent) = if protocol == Protocol::Udp {
        let jitter = f64_at(&doc, "/end/sum/jitter_ms");
        let loss = f64_at(&doc, "/end/sum/lost_percent").or_else(|| {
            let lost = f64_at(&doc, "/end/sum/lost_packets")?;
            let packets = f64_at(&doc, "/end/sum/packets")?;
            (packets > 0.0).then(|| lost / packets * 100.0)
        });
        (jitter, loss)
    } else {
        (None, None)
    };

    let duration_s = f64_at(&doc, "/end/sum_sent/seconds")
        .or_else(|| f64_at(&doc, "/end/sum/seconds"))
        .or_else(|| f64_at(&doc, "/start/test_start/duration"));

    let start_time = doc
        .pointer("/start/timestamp/time")
        .and_then(Value::as_str)
        .map(str::to_string);

    let samples: Vec<Sample> = doc
        .get("intervals")
        .and_then(Value::as_array)
        .map(|intervals| {
            intervals
                .iter()
                .enumerate()
                .map(|(i, interval)| {
                    let offset = f64_at(interval, "/sum/end").unwrap_or((i + 1) as f64);
                    match mbps_at(interval, "/sum/bits_per_second") {
                        Some(v) => Sample::present(offset, v),
                        None => Sample::missing(offset),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    let interval_stats = summarize(&SampleSeries::new(samples));

    if let Some(message) = &tool_error {
        let measured = mbps.is_some()
            || jitter_ms.is_some()
            || loss_percent.is_some()
            || interval_stats.has_data();
        if !measured {
            return Err(ArtifactError::ToolError(message.clone()));
        }
        warn!("Bandwidth report carries tool error, keeping partial results: {}", message);
    }

    Ok(BandwidthSummary {
        protocol,
        direction,
        mbps,
        sender_mbps,
        receiver_mbps,
        jitter_ms,
        loss_percent,
        duration_s,
        start_time,
        tool_error,
        interval_stats,
    })
}
