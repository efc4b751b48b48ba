//! Rebuild run metrics from a run directory already on disk.

use std::fs;

use color_eyre::eyre::{Context, Result};
use log::{debug, warn};

use super::record::{RunId, RunMetrics};
use crate::artifacts::layout::RunFiles;
use crate::artifacts::Trace;
use crate::interface::InterfaceHint;
use crate::probe::ProbeKind;

/// Everything recoverable from one run directory
#[derive(Debug, Clone)]
pub struct CollectedRun {
    pub id: RunId,
    /// Measurement server and WAN target the run was made against
    pub server: Option<String>,
    pub wan_target: Option<String>,
    pub metrics: RunMetrics,
    pub traces: Vec<(ProbeKind, Trace)>,
}

/// Parse every artifact of a scanned run directory.
///
/// Interface identity comes from `run.json` when it was recorded there,
/// otherwise from `fallback`. Statuses are taken from `run.json` only; a
/// legacy directory without it carries no status columns.
pub fn collect_run(run: &RunFiles, fallback: &InterfaceHint) -> Result<CollectedRun> {
    let meta = &run.meta;
    let id = RunId::new(meta.test_id.clone(), meta.run_name.clone(), meta.timestamp);
    let hint = InterfaceHint {
        name: meta.interface_name.clone().or_else(|| fallback.name.clone()),
        hardware_port: meta
            .hardware_port
            .clone()
            .or_else(|| fallback.hardware_port.clone()),
    };

    let mut metrics = RunMetrics {
        gateway: meta.gateway.clone(),
        ..Default::default()
    };
    let mut traces = Vec::new();

    for (kind, path) in &run.files {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let text = String::from_utf8_lossy(&bytes);
        debug!("Collecting {} from {}", kind, path.display());
        if let Some(trace) =
            metrics.record_payload(*kind, &text, &hint, meta.ping_count as usize)
        {
            traces.push((*kind, trace));
        }
    }

    for (kind, probe) in &meta.probes {
        metrics.set_status(*kind, probe.outcome);
        if probe.outcome.is_ok() && !run.files.contains_key(kind) {
            warn!(
                "{}: {} reported ok but its artifact is missing",
                run.dir.display(),
                kind
            );
        }
    }

    Ok(CollectedRun {
        id,
        server: meta.server.clone(),
        wan_target: meta.wan_target.clone(),
        metrics,
        traces,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::layout::{artifact_file_name, scan_run_dir, ProbeMeta, RunMeta};
    use crate::artifacts::ArtifactLayout;
    use crate::probe::ProbeStatus;
    use chrono::NaiveDateTime;
    use tempfile::TempDir;

    #[test]
    fn test_collect_run_with_meta() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        let stamp = "20250106_100000";
        let dir = layout.create_run_dir("NIC_A", stamp).unwrap();

        let ts = NaiveDateTime::parse_from_str(stamp, "%Y%m%d_%H%M%S").unwrap();
        let mut meta = RunMeta::new("NIC_A", Some("pos0".to_string()), ts);
        meta.ping_count = 4;
        meta.gateway = Some("192.168.1.1".to_string());
        meta.probes.insert(ProbeKind::PingWan, ProbeMeta {
            outcome: ProbeStatus::Ok { attempts: 1 },
            command: Some("ping".to_string()),
            file: None,
            exit_status: Some(0),
            elapsed_s: 4.0,
        });
        meta.probes.insert(ProbeKind::PingGateway, ProbeMeta::skipped());
        meta.write(&dir).unwrap();

        fs::write(
            dir.join(artifact_file_name(ProbeKind::PingWan, "NIC_A", stamp)),
            "time=10 ms\ntime=30 ms\n",
        )
        .unwrap();
        fs::write(
            dir.join(artifact_file_name(ProbeKind::TraceWan, "NIC_A", stamp)),
            " 1  192.168.1.1  1.0 ms\n 2  8.8.8.8  9.0 ms\n",
        )
        .unwrap();

        let run = scan_run_dir(&dir).unwrap();
        let collected = collect_run(&run, &InterfaceHint::default()).unwrap();

        assert_eq!(collected.id.run_name.as_deref(), Some("pos0"));
        let ping = &collected.metrics.latency[&ProbeKind::PingWan];
        assert_eq!(ping.requested, 4);
        assert_eq!(ping.loss_percent, 50.0);
        assert_eq!(collected.metrics.gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(collected.traces.len(), 1);
        assert_eq!(collected.metrics.statuses[&ProbeKind::PingGateway], ProbeStatus::Skipped);
    }

    #[test]
    fn test_collect_legacy_directory() {
        let tmp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(tmp.path());
        let dir = layout.create_run_dir("old", "20240101_080000").unwrap();
        fs::write(
            dir.join(artifact_file_name(ProbeKind::RouteTable, "old", "20240101_080000")),
            "default via 10.0.0.1 dev wlan0\n",
        )
        .unwrap();

        let run = scan_run_dir(&dir).unwrap();
        let collected = collect_run(&run, &InterfaceHint::default()).unwrap();
        assert_eq!(collected.id.test_id, "old");
        assert_eq!(collected.metrics.gateway.as_deref(), Some("10.0.0.1"));
        assert!(collected.metrics.statuses.is_empty());
    }
}
