//! Run identity, per-run metrics and their flattening into a RunRecord.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::artifacts::{
    extract_default_gateway, parse_bandwidth, parse_latency, parse_trace, BandwidthSummary, Trace,
};
use crate::interface::{classify, InterfaceHint, InterfaceSnapshot};
use crate::probe::{ProbeKind, ProbeStatus};
use crate::stats::{summarize, StatSummary};

/// Timestamp format used in tables; sub-second digits only when present
pub const TABLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Identity columns present in every row
pub const ID_COLUMNS: [&str; 3] = ["test_id", "run_name", "timestamp"];

/// Interface and run-level columns, in table order
const RUN_COLUMNS: [&str; 12] = [
    "interface",
    "hardware_port",
    "link_type",
    "ssid",
    "bssid",
    "channel",
    "rssi",
    "noise",
    "snr",
    "signal_percent",
    "last_tx_rate_mbps",
    "gateway",
];

/// Per-probe column suffixes, in table order
const PROBE_SUFFIXES: [&str; 17] = [
    "mbps",
    "p95_mbps",
    "jitter_ms",
    "packet_loss_pct",
    "count",
    "requested",
    "mean_ms",
    "min_ms",
    "max_ms",
    "std_ms",
    "p95_ms",
    "rtt_jitter_ms",
    "loss_pct",
    "hops",
    "skipped_hops",
    "status",
    "attempts",
];

const ALL_KINDS: [ProbeKind; 10] = [
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
];

/// Canonical position of a column: identity, run-level, then per probe
/// in execution order. Unknown columns sort last.
pub fn column_rank(name: &str) -> (usize, usize) {
    if let Some(i) = ID_COLUMNS.iter().position(|c| *c == name) {
        return (0, i);
    }
    if let Some(i) = RUN_COLUMNS.iter().position(|c| *c == name) {
        return (1, i);
    }
    for (k, kind) in ALL_KINDS.iter().enumerate() {
        let Some(suffix) = name
            .strip_prefix(kind.tag())
            .and_then(|rest| rest.strip_prefix('_'))
        else {
            continue;
        };
        if let Some(i) = PROBE_SUFFIXES.iter().position(|s| *s == suffix) {
            return (2 + k, i);
        }
    }
    (usize::MAX, 0)
}

/// Key of one run
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub test_id: String,
    pub run_name: Option<String>,
    pub timestamp: NaiveDateTime,
}

impl RunId {
    pub fn new(test_id: impl Into<String>, run_name: Option<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            test_id: test_id.into(),
            run_name,
            timestamp,
        }
    }

    /// Short label used for first-seen annotations and reports
    pub fn label(&self) -> String {
        let stamp = self.timestamp.format(crate::artifacts::layout::STAMP_FORMAT);
        match &self.run_name {
            Some(name) => format!("{}/{}_{}", self.test_id, name, stamp),
            None => format!("{}_{}", self.test_id, stamp),
        }
    }
}

/// One table cell; numbers and text are kept apart so export is lossless
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Num(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Num(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Num(_) => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Num(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Typed outputs of one run before flattening
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub interface: Option<InterfaceSnapshot>,
    pub gateway: Option<String>,
    pub bandwidth: BTreeMap<ProbeKind, BandwidthSummary>,
    pub latency: BTreeMap<ProbeKind, StatSummary>,
    /// (resolved, skipped) hop counts per path probe
    pub paths: BTreeMap<ProbeKind, (usize, usize)>,
    pub statuses: BTreeMap<ProbeKind, ProbeStatus>,
}

impl RunMetrics {
    /// Convert one probe payload into typed metrics.
    ///
    /// Malformed payloads leave their fields absent. Path payloads are
    /// returned so the caller can feed the topology.
    pub fn record_payload(
        &mut self,
        kind: ProbeKind,
        text: &str,
        hint: &InterfaceHint,
        requested: usize,
    ) -> Option<Trace> {
        match kind {
            ProbeKind::InterfaceState => {
                self.interface = Some(classify(text, hint));
            }
            ProbeKind::RouteTable => {
                if self.gateway.is_none() {
                    self.gateway = extract_default_gateway(text);
                }
            }
            k if k.is_bandwidth() => match parse_bandwidth(text) {
                Ok(summary) => {
                    self.bandwidth.insert(k, summary);
                }
                Err(e) => warn!("{} artifact unusable: {}", k, e),
            },
            k if k.is_latency() => {
                let series = parse_latency(text, requested);
                self.latency.insert(k, summarize(&series));
            }
            k => match parse_trace(text) {
                Ok(trace) => {
                    let resolved = trace.resolved_hops().count();
                    self.paths.insert(k, (resolved, trace.hops.len() - resolved));
                    return Some(trace);
                }
                Err(e) => warn!("{} artifact unusable: {}", k, e),
            },
        }
        None
    }

    pub fn set_status(&mut self, kind: ProbeKind, status: ProbeStatus) {
        self.statuses.insert(kind, status);
    }

    /// Flatten into named cells; absent values are simply not present
    pub fn flatten(&self) -> BTreeMap<String, FieldValue> {
        let mut fields: BTreeMap<String, FieldValue> = BTreeMap::new();
        let mut num = |name: String, v: Option<f64>| {
            if let Some(v) = v {
                fields.insert(name, FieldValue::Num(v));
            }
        };

        if let Some(snap) = &self.interface {
            num("channel".into(), snap.channel.map(f64::from));
            num("rssi".into(), snap.rssi_dbm);
            num("noise".into(), snap.noise_dbm);
            num("snr".into(), snap.snr_db);
            num("signal_percent".into(), snap.signal_percent);
            num("last_tx_rate_mbps".into(), snap.rate_mbps);
        }

        for (kind, bw) in &self.bandwidth {
            let tag = kind.tag();
            num(format!("{}_mbps", tag), bw.mbps);
            num(format!("{}_p95_mbps", tag), bw.p95_mbps());
            num(format!("{}_jitter_ms", tag), bw.jitter_ms);
            num(format!("{}_packet_loss_pct", tag), bw.loss_percent);
        }

        for (kind, stats) in &self.latency {
            let tag = kind.tag();
            num(format!("{}_count", tag), Some(stats.count as f64));
            num(format!("{}_requested", tag), Some(stats.requested as f64));
            num(format!("{}_mean_ms", tag), stats.mean);
            num(format!("{}_min_ms", tag), stats.min);
            num(format!("{}_max_ms", tag), stats.max);
            num(format!("{}_std_ms", tag), stats.std_dev);
            num(format!("{}_p95_ms", tag), stats.p95);
            num(format!("{}_rtt_jitter_ms", tag), stats.jitter);
            num(format!("{}_loss_pct", tag), Some(stats.loss_percent));
        }

        for (kind, (resolved, skipped)) in &self.paths {
            num(format!("{}_hops", kind.tag()), Some(*resolved as f64));
            num(format!("{}_skipped_hops", kind.tag()), Some(*skipped as f64));
        }

        for (kind, status) in &self.statuses {
            if !matches!(status, ProbeStatus::Skipped) {
                num(format!("{}_attempts", kind.tag()), Some(status.attempts() as f64));
            }
        }

        let mut text = |name: &str, v: Option<&str>| {
            if let Some(v) = v {
                fields.insert(name.to_string(), FieldValue::Text(v.to_string()));
            }
        };
        if let Some(snap) = &self.interface {
            text("interface", snap.name.as_deref());
            text("hardware_port", snap.hardware_port.as_deref());
            text("link_type", Some(snap.link_type.as_str()));
            text("ssid", snap.ssid.as_deref());
            text("bssid", snap.bssid.as_deref());
        }
        text("gateway", self.gateway.as_deref());
        for (kind, status) in &self.statuses {
            fields.insert(
                format!("{}_status", kind.tag()),
                FieldValue::Text(status.label().to_string()),
            );
        }

        fields
    }
}

/// One flattened, append-only row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl RunRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn num(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }

    /// Fields in canonical column order
    pub fn ordered_fields(&self) -> Vec<(&str, &FieldValue)> {
        let mut fields: Vec<(&str, &FieldValue)> =
            self.fields.iter().map(|(k, v)| (k.as_str(), v)).collect();
        fields.sort_by(|a, b| column_rank(a.0).cmp(&column_rank(b.0)).then(a.0.cmp(b.0)));
        fields
    }

    /// Whether at least one throughput or latency measurement is present
    pub fn has_usable_probe(&self) -> bool {
        self.fields.iter().any(|(name, value)| {
            ((name.ends_with("_mbps") && name != "last_tx_rate_mbps") || name.ends_with("_mean_ms"))
                && value.as_f64().is_some()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_rank_orders_by_probe_then_suffix() {
        assert!(column_rank("test_id") < column_rank("rssi"));
        assert!(column_rank("rssi") < column_rank("tcp_dl_mbps"));
        assert!(column_rank("tcp_dl_mbps") < column_rank("tcp_dl_status"));
        assert!(column_rank("tcp_dl_status") < column_rank("udp_ul_mbps"));
        assert!(column_rank("ping_gw_loss_pct") < column_rank("ping_wan_count"));
        assert_eq!(column_rank("custom"), (usize::MAX, 0));
    }

    #[test]
    fn test_record_payload_and_flatten() {
        let mut metrics = RunMetrics::default();
        let hint = InterfaceHint::default();

        let ping = "time=10 ms\ntime=20 ms\nRequest timeout for icmp_seq 2\ntime=30 ms\n";
        assert!(metrics.record_payload(ProbeKind::PingWan, ping, &hint, 4).is_none());
        metrics.record_payload(ProbeKind::RouteTable, "default via 192.168.1.1 dev eth0\n", &hint, 0);
        metrics.record_payload(ProbeKind::TcpDownload, "not json", &hint, 0);
        let trace = metrics
            .record_payload(ProbeKind::TraceWan, " 1  192.168.1.1  1.0 ms\n 2  * * *\n", &hint, 0)
            .unwrap();
        assert_eq!(trace.hops.len(), 2);
        metrics.set_status(ProbeKind::PingWan, ProbeStatus::Ok { attempts: 2 });
        metrics.set_status(ProbeKind::PingGateway, ProbeStatus::Skipped);

        let fields = metrics.flatten();
        assert_eq!(fields["ping_wan_mean_ms"], FieldValue::Num(20.0));
        assert_eq!(fields["ping_wan_loss_pct"], FieldValue::Num(25.0));
        assert_eq!(fields["ping_wan_attempts"], FieldValue::Num(2.0));
        assert_eq!(fields["ping_wan_status"], FieldValue::Text("ok".to_string()));
        assert_eq!(fields["ping_gw_status"], FieldValue::Text("skipped".to_string()));
        assert!(!fields.contains_key("ping_gw_attempts"));
        assert_eq!(fields["gateway"], FieldValue::Text("192.168.1.1".to_string()));
        assert_eq!(fields["trace_wan_hops"], FieldValue::Num(1.0));
        assert_eq!(fields["trace_wan_skipped_hops"], FieldValue::Num(1.0));
        // Malformed bandwidth artifact leaves its fields out
        assert!(!fields.contains_key("tcp_dl_mbps"));
    }

    #[test]
    fn test_usable_probe_ignores_link_rate() {
        let ts = NaiveDateTime::parse_from_str("20250106_100000", "%Y%m%d_%H%M%S").unwrap();
        let id = RunId::new("t", None, ts);
        let mut fields = BTreeMap::new();
        fields.insert("last_tx_rate_mbps".to_string(), FieldValue::Num(300.0));
        let record = RunRecord { id: id.clone(), fields };
        assert!(!record.has_usable_probe());

        let mut fields = BTreeMap::new();
        fields.insert("udp_ul_mbps".to_string(), FieldValue::Num(9.5));
        assert!(RunRecord { id, fields }.has_usable_probe());
    }
}
