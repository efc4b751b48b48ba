//! Report generation for measurement series.
//!
//! Generates both JSON and human-readable text reports from the run table
//! and the cumulative topology graph.

use std::fs;
use std::path::Path;

use chrono::Local;
use color_eyre::eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::aggregate::{assess_quality, DataQualityWarning, RunRecord};
use crate::probe::ProbeKind;
use crate::topology::{Graph, TopologyNode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: String,
    pub artifacts_root: String,
    pub total_runs: usize,
    pub traces_ingested: usize,
}

/// Everything a report shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    pub runs: Vec<RunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topology: Option<Graph>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_warning: Option<DataQualityWarning>,
}

impl AnalysisReport {
    pub fn new(artifacts_root: &Path, runs: Vec<RunRecord>, topology: Option<Graph>) -> Self {
        let quality_warning = assess_quality(&runs);
        Self {
            metadata: ReportMetadata {
                generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                artifacts_root: artifacts_root.display().to_string(),
                total_runs: runs.len(),
                traces_ingested: topology.as_ref().map_or(0, |g| g.traces_ingested),
            },
            runs,
            topology,
            quality_warning,
        }
    }
}

/// Generate JSON report
pub fn generate_json_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn fmt_opt(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:.1}{}", v, unit),
        None => "-".to_string(),
    }
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push("=".repeat(80));
    lines.push(format!("{:^80}", title));
    lines.push("=".repeat(80));
    lines.push(String::new());
}

fn node_line(node: &TopologyNode) -> String {
    format!(
        "  {:<28} {:<13} {:>9} {:>6}x  first: {}",
        node.label(),
        node.role.as_str(),
        fmt_opt(node.avg_rtt_ms(), " ms"),
        node.appearances,
        node.first_seen_run
    )
}

/// Render the text report
pub fn render_text_report(report: &AnalysisReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    section(&mut lines, "NETWORK PROBE SERIES REPORT");

    lines.push(format!("Report Date: {}", report.metadata.generated_at));
    lines.push(format!("Artifacts Root: {}", report.metadata.artifacts_root));
    lines.push(format!("Runs: {}", report.metadata.total_runs));
    lines.push(format!("Traces Ingested: {}", report.metadata.traces_ingested));
    lines.push(String::new());

    if let Some(warning) = &report.quality_warning {
        lines.push(format!("WARNING: {}", warning));
        lines.push(String::new());
    }

    if !report.runs.is_empty() {
        section(&mut lines, "RUN OVERVIEW");
        lines.push(format!(
            "  {:<32} {:>9} {:>9} {:>9} {:>9} {:>9} {:>7}",
            "Run", "TCP DL", "TCP UL", "UDP DL", "UDP UL", "WAN RTT", "Loss"
        ));
        for run in &report.runs {
            let mbps = |kind: ProbeKind| run.num(&format!("{}_mbps", kind.tag()));
            lines.push(format!(
                "  {:<32} {:>9} {:>9} {:>9} {:>9} {:>9} {:>7}",
                run.id.label(),
                fmt_opt(mbps(ProbeKind::TcpDownload), ""),
                fmt_opt(mbps(ProbeKind::TcpUpload), ""),
                fmt_opt(mbps(ProbeKind::UdpDownload), ""),
                fmt_opt(mbps(ProbeKind::UdpUpload), ""),
                fmt_opt(run.num("ping_wan_mean_ms"), ""),
                fmt_opt(run.num("ping_wan_loss_pct"), "%"),
            ));
        }
        lines.push("  (throughput in Mbps, RTT in ms)".to_string());
        lines.push(String::new());

        section(&mut lines, "PER-RUN DETAIL");
        for run in &report.runs {
            lines.push(format!("{}:", run.id.label()));
            if let Some(link) = run.get("link_type") {
                let iface = run.get("interface").map(|v| v.to_string()).unwrap_or_default();
                lines.push(format!("  Interface: {} ({})", iface, link));
            }
            if let Some(rssi) = run.num("rssi") {
                lines.push(format!(
                    "  Signal: {:.0} dBm, SNR {}, rate {}",
                    rssi,
                    fmt_opt(run.num("snr"), " dB"),
                    fmt_opt(run.num("last_tx_rate_mbps"), " Mbps")
                ));
            }
            for kind in ProbeKind::BANDWIDTH {
                let tag = kind.tag();
                if let Some(mbps) = run.num(&format!("{}_mbps", tag)) {
                    lines.push(format!(
                        "  {:<8} {:.1} Mbps (p95 {}, jitter {}, loss {})",
                        tag,
                        mbps,
                        fmt_opt(run.num(&format!("{}_p95_mbps", tag)), ""),
                        fmt_opt(run.num(&format!("{}_jitter_ms", tag)), " ms"),
                        fmt_opt(run.num(&format!("{}_packet_loss_pct", tag)), "%"),
                    ));
                }
            }
            for kind in ProbeKind::LATENCY {
                let tag = kind.tag();
                if let Some(loss) = run.num(&format!("{}_loss_pct", tag)) {
                    lines.push(format!(
                        "  {:<8} mean {} p95 {} jitter {} loss {:.1}%",
                        tag,
                        fmt_opt(run.num(&format!("{}_mean_ms", tag)), " ms"),
                        fmt_opt(run.num(&format!("{}_p95_ms", tag)), " ms"),
                        fmt_opt(run.num(&format!("{}_rtt_jitter_ms", tag)), " ms"),
                        loss
                    ));
                }
            }
            let failed: Vec<&str> = run
                .fields
                .iter()
                .filter(|(name, v)| name.ends_with("_status") && v.as_text() == Some("failed"))
                .map(|(name, _)| name.trim_end_matches("_status"))
                .collect();
            if !failed.is_empty() {
                lines.push(format!("  Failed probes: {}", failed.join(", ")));
            }
            lines.push(String::new());
        }
    }

    if let Some(graph) = &report.topology {
        section(&mut lines, "TOPOLOGY");
        lines.push(format!(
            "Nodes: {}  Edges: {}",
            graph.nodes.len(),
            graph.edges.len()
        ));
        lines.push(String::new());

        lines.push("Nodes:".to_string());
        for node in &graph.nodes {
            lines.push(node_line(node));
        }
        lines.push(String::new());

        lines.push("Edges:".to_string());
        let mut edges: Vec<_> = graph.edges.iter().collect();
        edges.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        for edge in edges {
            lines.push(format!(
                "  {} -> {}  x{} ({:?})  {}",
                edge.from,
                edge.to,
                edge.usage_count,
                edge.usage_tier(),
                fmt_opt(edge.avg_rtt_ms(), " ms")
            ));
        }
        lines.push(String::new());
    }

    // Footer
    lines.push("=".repeat(80));
    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &AnalysisReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text_report(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Short summary for the terminal
pub fn summary_lines(report: &AnalysisReport) -> Vec<String> {
    let mut lines = vec![
        "=== NETWORK PROBE SUMMARY ===".to_string(),
        format!("Runs: {}", report.metadata.total_runs),
    ];
    if let Some(graph) = &report.topology {
        lines.push(format!(
            "Topology: {} nodes, {} edges from {} traces",
            graph.nodes.len(),
            graph.edges.len(),
            graph.traces_ingested
        ));
    }
    if let Some(last) = report.runs.last() {
        lines.push(format!("Latest run: {}", last.id.label()));
        for kind in ProbeKind::BANDWIDTH {
            if let Some(mbps) = last.num(&format!("{}_mbps", kind.tag())) {
                lines.push(format!("  {}: {:.1} Mbps", kind.tag(), mbps));
            }
        }
    }
    if let Some(warning) = &report.quality_warning {
        lines.push(format!("WARNING: {}", warning));
    }
    lines
}
