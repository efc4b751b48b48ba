//! Artifact directory layout.
//!
//! One directory per run, `artifacts_<test_id>_<YYYYmmdd_HHMMSS>/`, holding
//! one file per probe plus a `run.json` metadata file:
//!
//! ```text
//! artifacts_NIC_A_Pos0_20250106_100000/
//!   run.json
//!   wlan_NIC_A_Pos0_20250106_100000.txt
//!   route_NIC_A_Pos0_20250106_100000.txt
//!   iperf_NIC_A_Pos0_20250106_100000_tcp_dl.json
//!   ping_NIC_A_Pos0_20250106_100000_gw.txt
//!   traceroute_NIC_A_Pos0_20250106_100000_server.txt
//!   ...
//! ```
//!
//! Directories written before `run.json` existed are still readable; their
//! identity is recovered from the directory name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use color_eyre::eyre::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::probe::{ProbeKind, ProbeResult, ProbeStatus};

/// Timestamp format used in directory and file names
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const RUN_META_FILE: &str = "run.json";
pub const RUN_DIR_PREFIX: &str = "artifacts_";

static RUN_DIR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^artifacts_(.+)_(\d{8}_\d{6})$").expect("Invalid run dir regex")
});

/// Per-probe entry of `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeMeta {
    pub outcome: ProbeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// File name relative to the run directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    #[serde(default)]
    pub elapsed_s: f64,
}

impl ProbeMeta {
    pub fn from_result(result: &ProbeResult) -> Self {
        Self {
            outcome: result.status(),
            command: Some(result.command.clone()),
            file: result
                .artifact
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned()),
            exit_status: result.exit_status,
            elapsed_s: result.elapsed.as_secs_f64(),
        }
    }

    pub fn skipped() -> Self {
        Self {
            outcome: ProbeStatus::Skipped,
            command: None,
            file: None,
            exit_status: None,
            elapsed_s: 0.0,
        }
    }
}

/// Contents of `run.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub test_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    pub timestamp: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wan_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Latency samples requested per ping probe
    #[serde(default)]
    pub ping_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware_port: Option<String>,
    #[serde(default)]
    pub probes: BTreeMap<ProbeKind, ProbeMeta>,
}

impl RunMeta {
    pub fn new(test_id: impl Into<String>, run_name: Option<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            test_id: test_id.into(),
            run_name,
            timestamp,
            server: None,
            wan_target: None,
            gateway: None,
            ping_count: 0,
            interface_name: None,
            hardware_port: None,
            probes: BTreeMap::new(),
        }
    }

    pub fn stamp(&self) -> String {
        self.timestamp.format(STAMP_FORMAT).to_string()
    }

    pub fn write(&self, run_dir: &Path) -> Result<()> {
        let path = run_dir.join(RUN_META_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn read(run_dir: &Path) -> Result<Self> {
        let path = run_dir.join(RUN_META_FILE);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Naming rules for run directories and probe artifacts under one root
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, test_id: &str, stamp: &str) -> PathBuf {
        self.root.join(format!("{}{}_{}", RUN_DIR_PREFIX, test_id, stamp))
    }

    /// Create the run directory (and the root) if needed
    pub fn create_run_dir(&self, test_id: &str, stamp: &str) -> Result<PathBuf> {
        let dir = self.run_dir(test_id, stamp);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Run directories under the root, sorted by name, optionally restricted
    /// to names containing `filter`
    pub fn discover_run_dirs(&self, filter: Option<&str>) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("Failed to read artifacts root {}", self.root.display()))?;

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|name| {
                        name.starts_with(RUN_DIR_PREFIX)
                            && filter.map_or(true, |f| name.contains(f))
                    })
                    .unwrap_or(false)
            })
            .collect();
        dirs.sort();
        Ok(dirs)
    }
}

/// File name for one probe's artifact
pub fn artifact_file_name(kind: ProbeKind, test_id: &str, stamp: &str) -> String {
    match kind {
        ProbeKind::InterfaceState => format!("wlan_{}_{}.txt", test_id, stamp),
        ProbeKind::RouteTable => format!("route_{}_{}.txt", test_id, stamp),
        ProbeKind::TcpDownload
        | ProbeKind::TcpUpload
        | ProbeKind::UdpDownload
        | ProbeKind::UdpUpload => format!("iperf_{}_{}_{}.json", test_id, stamp, kind.tag()),
        ProbeKind::PingGateway => format!("ping_{}_{}_gw.txt", test_id, stamp),
        ProbeKind::PingWan => format!("ping_{}_{}_wan.txt", test_id, stamp),
        ProbeKind::TraceServer => format!("traceroute_{}_{}_server.txt", test_id, stamp),
        ProbeKind::TraceWan => format!("traceroute_{}_{}_wan.txt", test_id, stamp),
    }
}

/// Recover the probe kind from an artifact file name
pub fn kind_from_file_name(name: &str) -> Option<ProbeKind> {
    if name.starts_with("iperf_") && name.ends_with(".json") {
        let stem = name.trim_end_matches(".json");
        return ProbeKind::BANDWIDTH
            .into_iter()
            .find(|k| stem.ends_with(&format!("_{}", k.tag())));
    }
    if name.starts_with("ping_") {
        if name.ends_with("_gw.txt") {
            return Some(ProbeKind::PingGateway);
        }
        if name.ends_with("_wan.txt") {
            return Some(ProbeKind::PingWan);
        }
    }
    if name.starts_with("traceroute_") {
        if name.ends_with("_server.txt") {
            return Some(ProbeKind::TraceServer);
        }
        if name.ends_with("_wan.txt") {
            return Some(ProbeKind::TraceWan);
        }
    }
    if name.starts_with("wlan_") && name.ends_with(".txt") {
        return Some(ProbeKind::InterfaceState);
    }
    if name.starts_with("route_") && name.ends_with(".txt") {
        return Some(ProbeKind::RouteTable);
    }
    None
}

/// Test id and timestamp encoded in a run directory name
pub fn parse_run_dir_name(name: &str) -> Option<(String, NaiveDateTime)> {
    let caps = RUN_DIR_NAME.captures(name)?;
    let test_id = caps.get(1)?.as_str().to_string();
    let ts = NaiveDateTime::parse_from_str(caps.get(2)?.as_str(), STAMP_FORMAT).ok()?;
    Some((test_id, ts))
}

/// A run directory on disk: its metadata and the artifact file per probe
#[derive(Debug, Clone)]
pub struct RunFiles {
    pub dir: PathBuf,
    pub meta: RunMeta,
    pub files: BTreeMap<ProbeKind, PathBuf>,
}

/// Read `run.json` (or infer identity from the directory name) and index
/// the artifact files present.
pub fn scan_run_dir(dir: &Path) -> Result<RunFiles> {
    let meta = if dir.join(RUN_META_FILE).exists() {
        RunMeta::read(dir)?
    } else {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (test_id, ts) = parse_run_dir_name(name).ok_or_else(|| {
            color_eyre::eyre::eyre!("Cannot infer run identity from directory {}", dir.display())
        })?;
        RunMeta::new(test_id, None, ts)
    };

    let mut files = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Leftover attempt temps are never artifacts
        if name.ends_with(".tmp") {
            continue;
        }
        if let Some(kind) = kind_from_file_name(name) {
            files.entry(kind).or_insert(path);
        }
    }

    Ok(RunFiles { dir: dir.to_path_buf(), meta, files })
}
