//! # NetProbe - Measurement orchestration for repeated network probe runs
//!
//! This library runs external measurement tools (iperf3, ping, traceroute,
//! interface and routing dumps) against a server, keeps their raw output
//! as artifacts, and turns a series of runs into a comparison table and a
//! cumulative network topology.
//!
//! ## Overview
//!
//! A *run* is one complete set of probes executed under a single test id
//! and timestamp. Runs are repeated (loop mode) or collected from earlier
//! sessions, and every run adds one row to the run table and every
//! path-discovery trace it produced to the topology graph.
//!
//! ## Architecture
//!
//! - `probe`: command specs, the `ProbeClient` seam and the retrying executor
//! - `stats`: sample series and summary statistics (mean, p95, jitter, loss)
//! - `interface`: parsing of raw adapter/radio text into a typed snapshot
//! - `artifacts`: parsers for bandwidth, latency, path and route artifacts,
//!   plus the on-disk layout of run directories
//! - `topology`: rule-based node roles and the usage-weighted graph
//! - `aggregate`: flattening of a run into a `RunRecord` and the run table
//! - `report`: JSON and text reports
//! - `config` / `config_loader`: YAML configuration and CLI overrides
//! - `orchestrator`: one run, or a loop of runs, end to end
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use netprobe::{config_loader, orchestrator::Orchestrator};
//! use std::path::Path;
//!
//! let config = config_loader::load_config(Path::new("netprobe.yaml"))?;
//! let mut orchestrator = Orchestrator::from_config(config)?;
//! orchestrator.resume()?;
//! orchestrator.run_once(chrono::Local::now().naive_local())?;
//! # Ok::<(), color_eyre::eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   test_id: NIC_A_Pos0
//!   artifacts_root: results
//!
//! probes:
//!   server: 192.0.2.10
//!   duration: 30s
//!   udp_target_mbps: 100
//!   wan_target: 8.8.8.8
//!
//! retry:
//!   max_attempts: 8
//!   base_delay: 1s
//!   cap: 16s
//!
//! loop_mode:
//!   interval: 5m
//!   iterations: 12
//!
//! topology:
//!   measurement_servers: [192.0.2.10]
//!   radio_patterns: [silvus, mesh]
//! ```
//!
//! ## Error Handling
//!
//! Library modules define typed errors with `thiserror`; orchestration and
//! file handling return `color_eyre::eyre::Result` with context. A failed
//! probe never aborts a run: it shows up as a `failed` status column.

pub mod aggregate;
pub mod artifacts;
pub mod config;
pub mod config_loader;
pub mod interface;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod stats;
pub mod topology;
pub mod utils;
