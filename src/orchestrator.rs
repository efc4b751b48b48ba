//! Measurement run orchestrator.
//!
//! Runs the probes of one run strictly one after another, persists their
//! artifacts and feeds the two cumulative accumulators: the run table and
//! the topology builder. Both are owned here and only ever appended to.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use color_eyre::eyre::{Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;

use crate::aggregate::{
    collect_run, write_csv, write_json, CollectedRun, RunId, RunMetrics, RunRecord, RunTable,
};
use crate::artifacts::layout::{artifact_file_name, scan_run_dir};
use crate::artifacts::{ArtifactLayout, ProbeMeta, RunMeta, Trace};
use crate::config::Config;
use crate::interface::InterfaceHint;
use crate::probe::commands;
use crate::probe::{
    CommandProbeClient, CommandSpec, ProbeClient, ProbeExecutor, ProbeKind, ProbeStatus, Sleeper,
    ThreadSleeper,
};
use crate::topology::{generate_dot, Graph, IngestOutcome, RoleRules, TopologyBuilder};

pub const SUMMARY_CSV: &str = "summary.csv";
pub const SUMMARY_JSON: &str = "summary.json";
pub const TOPOLOGY_JSON: &str = "topology.json";
pub const TOPOLOGY_DOT: &str = "topology.dot";

/// What one `run_once` produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub record: RunRecord,
    pub ingested: Vec<(ProbeKind, IngestOutcome)>,
}

/// Tally of a `run_loop`; outcomes themselves are not retained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub completed: usize,
    pub failed: usize,
}

/// Topology rules for a config: the configured server is always a
/// measurement server and the WAN target always an endpoint
pub fn role_rules(config: &Config) -> Result<RoleRules> {
    let mut topology = config.topology.clone();
    let server = &config.probes.server;
    if !server.is_empty() && !topology.measurement_servers.contains(server) {
        topology.measurement_servers.push(server.clone());
    }
    let target = &config.probes.wan_target;
    if !target.is_empty() && !topology.endpoints.contains(target) {
        topology.endpoints.push(target.clone());
    }
    RoleRules::from_config(&topology).context("Invalid topology rules")
}

/// Write the cumulative table and graph files into `dir`
pub fn write_series_outputs(dir: &Path, records: &[RunRecord], graph: &Graph, title: &str) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    write_csv(&dir.join(SUMMARY_CSV), records)?;
    write_json(&dir.join(SUMMARY_JSON), records)?;

    let graph_path = dir.join(TOPOLOGY_JSON);
    let json = serde_json::to_string_pretty(graph).context("Failed to serialize topology")?;
    fs::write(&graph_path, json)
        .with_context(|| format!("Failed to write {}", graph_path.display()))?;

    let dot_path = dir.join(TOPOLOGY_DOT);
    fs::write(&dot_path, generate_dot(graph, title))
        .with_context(|| format!("Failed to write {}", dot_path.display()))?;

    debug!("Series outputs written to {}", dir.display());
    Ok(())
}

/// Add a run rebuilt from disk to both accumulators
pub fn fold_run(table: &mut RunTable, topology: &mut TopologyBuilder, run: CollectedRun) {
    if let Some(gw) = &run.metrics.gateway {
        topology.detect_gateway(gw);
    }
    let label = run.id.label();
    table.append_run(run.id, &run.metrics);
    for (_, trace) in &run.traces {
        topology.ingest(trace, &label);
    }
}

/// Fold a series of runs in order. Every server and WAN target recorded in
/// the runs' metadata is known to the role rules before the first trace.
pub fn fold_series(
    table: &mut RunTable,
    topology: &mut TopologyBuilder,
    runs: Vec<CollectedRun>,
) {
    let servers: Vec<String> = runs.iter().filter_map(|r| r.server.clone()).collect();
    let targets: Vec<String> = runs.iter().filter_map(|r| r.wan_target.clone()).collect();
    topology.learn_identities(&servers, &targets);
    for run in runs {
        fold_run(table, topology, run);
    }
}

/// Drives runs against one configuration
pub struct Orchestrator<C, S = ThreadSleeper, R = StdRng> {
    executor: ProbeExecutor<C, S, R>,
    config: Config,
    layout: ArtifactLayout,
    table: RunTable,
    topology: TopologyBuilder,
}

impl Orchestrator<CommandProbeClient> {
    /// Production orchestrator running real commands
    pub fn from_config(config: Config) -> Result<Self> {
        let client = CommandProbeClient::new(config.probes.command_timeout);
        let executor = ProbeExecutor::new(client, config.retry.clone());
        Self::new(config, executor)
    }
}

impl<C, S, R> Orchestrator<C, S, R>
where
    C: ProbeClient,
    S: Sleeper,
    R: Rng,
{
    pub fn new(config: Config, executor: ProbeExecutor<C, S, R>) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        let rules = role_rules(&config)?;
        let topology = TopologyBuilder::new(rules, config.topology.client_id.clone());
        let layout = ArtifactLayout::new(config.general.artifacts_root.clone());
        Ok(Self {
            executor,
            config,
            layout,
            table: RunTable::new(),
            topology,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn table(&self) -> &RunTable {
        &self.table
    }

    pub fn graph(&self) -> Graph {
        self.topology.build()
    }

    pub fn executor_mut(&mut self) -> &mut ProbeExecutor<C, S, R> {
        &mut self.executor
    }

    fn hint(&self) -> InterfaceHint {
        InterfaceHint {
            name: self.config.interface.name.clone(),
            hardware_port: self.config.interface.hardware_port.clone(),
        }
    }

    /// Fold run directories already under the artifacts root into both
    /// accumulators, so the series continues across invocations.
    /// Returns the number of runs loaded.
    pub fn resume(&mut self) -> Result<usize> {
        if !self.layout.root().exists() {
            return Ok(0);
        }
        let hint = self.hint();
        let mut runs = Vec::new();
        for dir in self.layout.discover_run_dirs(None)? {
            match scan_run_dir(&dir).and_then(|run| collect_run(&run, &hint)) {
                Ok(collected) => runs.push(collected),
                Err(e) => warn!("Skipping {}: {:#}", dir.display(), e),
            }
        }
        let loaded = runs.len();
        fold_series(&mut self.table, &mut self.topology, runs);
        if loaded > 0 {
            info!("Resumed {} previous runs from {}", loaded, self.layout.root().display());
        }
        Ok(loaded)
    }

    /// Execute one complete run stamped with `timestamp`
    pub fn run_once(&mut self, timestamp: NaiveDateTime) -> Result<RunOutcome> {
        let general = &self.config.general;
        let mut meta = RunMeta::new(general.test_id.clone(), general.run_name.clone(), timestamp);
        let stamp = meta.stamp();
        let run_dir = self.layout.create_run_dir(&meta.test_id, &stamp)?;
        info!("Starting run {} in {}", stamp, run_dir.display());

        meta.server = Some(self.config.probes.server.clone());
        meta.wan_target = Some(self.config.probes.wan_target.clone());
        meta.ping_count = self.config.ping_count();
        meta.interface_name = self.config.interface.name.clone();
        meta.hardware_port = self.config.interface.hardware_port.clone();

        let mut run = RunState {
            dir: run_dir.clone(),
            test_id: meta.test_id.clone(),
            stamp,
            hint: self.hint(),
            requested: meta.ping_count as usize,
            meta,
            metrics: RunMetrics::default(),
            traces: Vec::new(),
        };

        self.snapshot_interface(&mut run)?;

        match commands::route_table(&self.config.probes) {
            Some(spec) => self.probe(&mut run, &spec),
            None => run.skip(ProbeKind::RouteTable),
        }
        // A configured gateway outranks the detected one
        if let Some(gw) = &self.config.topology.default_gateway {
            run.metrics.gateway = Some(gw.clone());
        }
        run.meta.gateway = run.metrics.gateway.clone();
        if let Some(gw) = &run.metrics.gateway {
            self.topology.detect_gateway(gw);
        }

        for kind in ProbeKind::BANDWIDTH {
            if let Some(spec) = commands::bandwidth(kind, &self.config.probes) {
                self.probe(&mut run, &spec);
            }
        }

        if run.metrics.gateway.is_none() {
            warn!("No default gateway detected; skipping gateway latency probe");
            run.skip(ProbeKind::PingGateway);
        }
        let latency = commands::latency_pair(&self.config, run.metrics.gateway.as_deref());
        for spec in &latency {
            self.probe(&mut run, spec);
        }

        let probes = &self.config.probes;
        let traces = [
            commands::traceroute(ProbeKind::TraceServer, &probes.server, probes),
            commands::traceroute(ProbeKind::TraceWan, &probes.wan_target, probes),
        ];
        for spec in &traces {
            self.probe(&mut run, spec);
        }

        run.meta.write(&run.dir)?;

        let id = RunId::new(run.meta.test_id.clone(), run.meta.run_name.clone(), timestamp);
        let label = id.label();
        let record = self.table.append_run(id, &run.metrics).clone();

        let ingested: Vec<(ProbeKind, IngestOutcome)> = run
            .traces
            .iter()
            .map(|(kind, trace)| (*kind, self.topology.ingest(trace, &label)))
            .collect();

        self.write_outputs()?;

        let failed: Vec<&str> = run
            .metrics
            .statuses
            .iter()
            .filter(|(_, s)| matches!(s, ProbeStatus::Failed { .. }))
            .map(|(k, _)| k.tag())
            .collect();
        info!(
            "Run {} complete: {} fields, {} traces, failed probes: [{}]",
            label,
            record.fields.len(),
            ingested.len(),
            failed.join(", ")
        );

        if let Some(warning) = self.table.assess_quality() {
            warn!("Data quality: {}", warning);
        }

        Ok(RunOutcome {
            run_dir,
            record,
            ingested,
        })
    }

    /// Repeat runs per the loop settings, sleeping between them. Without
    /// loop settings a single run is made. `clock` stamps each run.
    ///
    /// A failing run in loop mode is logged and the loop carries on.
    /// Without an iteration cap this only returns on error.
    pub fn run_loop<F>(&mut self, mut clock: F) -> Result<LoopSummary>
    where
        F: FnMut() -> NaiveDateTime,
    {
        let Some(loop_mode) = self.config.loop_mode.clone() else {
            self.run_once(clock())?;
            return Ok(LoopSummary {
                completed: 1,
                failed: 0,
            });
        };

        info!(
            "Loop mode: every {:?}, {}",
            loop_mode.interval,
            loop_mode
                .iterations
                .map_or("until stopped".to_string(), |n| format!("{} iterations", n))
        );

        let mut summary = LoopSummary::default();
        let mut iteration: u32 = 0;
        loop {
            iteration += 1;
            match self.run_once(clock()) {
                Ok(_) => summary.completed += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!("Run {} failed: {:#}", iteration, e);
                }
            }
            if loop_mode.iterations.is_some_and(|cap| iteration >= cap) {
                break;
            }
            info!("Sleeping {:?} before next run", loop_mode.interval);
            self.sleep(loop_mode.interval);
        }
        Ok(summary)
    }

    fn sleep(&mut self, duration: Duration) {
        self.executor.sleeper_mut().sleep(duration);
    }

    pub fn write_outputs(&self) -> Result<()> {
        let title = format!("Topology: {}", self.config.general.test_id);
        write_series_outputs(self.layout.root(), self.table.records(), &self.graph(), &title)
    }

    /// Run one spec, persisting its artifact and folding the payload in
    fn probe(&mut self, run: &mut RunState, spec: &CommandSpec) {
        let path = run.artifact_path(spec.kind);
        let result = self.executor.execute_to(spec, &path);
        run.meta.probes.insert(spec.kind, ProbeMeta::from_result(&result));
        run.metrics.set_status(spec.kind, result.status());
        run.record(spec.kind, &result.payload_text());
    }

    /// Interface snapshots may need several commands; their accepted
    /// outputs are joined into one artifact
    fn snapshot_interface(&mut self, run: &mut RunState) -> Result<()> {
        let specs = commands::interface_state(&self.config.interface);
        if specs.is_empty() {
            run.skip(ProbeKind::InterfaceState);
            return Ok(());
        }

        let mut texts = Vec::new();
        let mut attempts = 0;
        let mut elapsed = 0.0;
        let mut any_ok = false;
        let mut last_exit = None;
        for spec in &specs {
            let result = self.executor.execute(spec);
            attempts += result.attempts;
            elapsed += result.elapsed.as_secs_f64();
            last_exit = result.exit_status;
            if !result.failed {
                any_ok = true;
                texts.push(result.payload_text());
            }
        }

        let path = run.artifact_path(ProbeKind::InterfaceState);
        let combined = texts.join("\n");
        fs::write(&path, &combined).with_context(|| format!("Failed to write {}", path.display()))?;

        let outcome = if any_ok {
            ProbeStatus::Ok { attempts }
        } else {
            ProbeStatus::Failed { attempts }
        };
        run.meta.probes.insert(
            ProbeKind::InterfaceState,
            ProbeMeta {
                outcome,
                command: Some(
                    specs
                        .iter()
                        .map(CommandSpec::identity)
                        .collect::<Vec<_>>()
                        .join(" ; "),
                ),
                file: path.file_name().map(|n| n.to_string_lossy().into_owned()),
                exit_status: last_exit,
                elapsed_s: elapsed,
            },
        );
        run.metrics.set_status(ProbeKind::InterfaceState, outcome);
        run.record(ProbeKind::InterfaceState, &combined);
        Ok(())
    }
}

/// Working state of the run in progress
struct RunState {
    dir: PathBuf,
    test_id: String,
    stamp: String,
    hint: InterfaceHint,
    requested: usize,
    meta: RunMeta,
    metrics: RunMetrics,
    traces: Vec<(ProbeKind, Trace)>,
}

impl RunState {
    fn artifact_path(&self, kind: ProbeKind) -> PathBuf {
        self.dir.join(artifact_file_name(kind, &self.test_id, &self.stamp))
    }

    fn skip(&mut self, kind: ProbeKind) {
        self.meta.probes.insert(kind, ProbeMeta::skipped());
        self.metrics.set_status(kind, ProbeStatus::Skipped);
    }

    fn record(&mut self, kind: ProbeKind, text: &str) {
        if let Some(trace) = self.metrics.record_payload(kind, text, &self.hint, self.requested) {
            self.traces.push((kind, trace));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeOutput, RetryPolicy};
    use rand::SeedableRng;
    use std::io;
    use tempfile::TempDir;

    /// Answers every command with a canned payload keyed by probe kind
    struct CannedClient {
        calls: Vec<ProbeKind>,
    }

    impl ProbeClient for CannedClient {
        fn invoke(&mut self, spec: &CommandSpec) -> io::Result<ProbeOutput> {
            self.calls.push(spec.kind);
            let body = match spec.kind {
                ProbeKind::InterfaceState => "SSID: lab\nagrCtlRSSI: -60\nagrCtlNoise: -90\n",
                ProbeKind::RouteTable => "default via 192.168.1.1 dev wlan0\n",
                ProbeKind::PingGateway | ProbeKind::PingWan => "time=5 ms\ntime=7 ms\n",
                ProbeKind::TraceServer | ProbeKind::TraceWan => " 1  192.168.1.1  1.0 ms\n",
                // Bandwidth probes never succeed
                _ => "",
            };
            Ok(ProbeOutput::success(body))
        }
    }

    #[derive(Default)]
    struct CountingSleeper {
        slept: Vec<Duration>,
    }

    impl Sleeper for CountingSleeper {
        fn sleep(&mut self, duration: Duration) {
            self.slept.push(duration);
        }
    }

    fn orchestrator(root: &Path) -> Orchestrator<CannedClient, CountingSleeper> {
        let mut config = Config::default();
        config.general.test_id = "unit".to_string();
        config.general.artifacts_root = root.to_path_buf();
        config.probes.server = "203.0.113.5".to_string();
        config.probes.duration = Duration::from_secs(1);
        config.probes.ping_rate_hz = 2;
        config.interface.commands = vec![vec!["iface".to_string()]];
        config.probes.route_command = vec!["route".to_string()];
        let policy = RetryPolicy {
            max_attempts: 2,
            ..Default::default()
        };
        let executor = ProbeExecutor::with_parts(
            CannedClient { calls: Vec::new() },
            CountingSleeper::default(),
            StdRng::seed_from_u64(1),
            policy,
        );
        Orchestrator::new(config, executor).unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y%m%d_%H%M%S").unwrap()
    }

    #[test]
    fn test_run_once_order_and_outputs() {
        let tmp = TempDir::new().unwrap();
        let mut orch = orchestrator(tmp.path());
        let outcome = orch.run_once(ts("20250106_100000")).unwrap();

        let calls = &orch.executor_mut().client_mut().calls;
        // Bandwidth probes are each tried twice
        assert_eq!(
            calls,
            &vec![
                ProbeKind::InterfaceState,
                ProbeKind::RouteTable,
                ProbeKind::TcpDownload,
                ProbeKind::TcpDownload,
                ProbeKind::TcpUpload,
                ProbeKind::TcpUpload,
                ProbeKind::UdpDownload,
                ProbeKind::UdpDownload,
                ProbeKind::UdpUpload,
                ProbeKind::UdpUpload,
                ProbeKind::PingGateway,
                ProbeKind::PingWan,
                ProbeKind::TraceServer,
                ProbeKind::TraceWan,
            ]
        );

        let record = &outcome.record;
        assert_eq!(record.get("tcp_dl_status").unwrap().as_text(), Some("failed"));
        assert_eq!(record.num("ping_gw_requested"), Some(2.0));
        assert_eq!(record.num("ping_wan_mean_ms"), Some(6.0));
        assert_eq!(record.num("rssi"), Some(-60.0));
        assert_eq!(outcome.ingested.len(), 2);

        for file in [SUMMARY_CSV, SUMMARY_JSON, TOPOLOGY_JSON, TOPOLOGY_DOT] {
            assert!(tmp.path().join(file).exists(), "{}", file);
        }
        assert!(outcome.run_dir.join("run.json").exists());

        let graph = orch.graph();
        assert_eq!(graph.edge("client", "192.168.1.1").unwrap().usage_count, 2);
    }

    #[test]
    fn test_loop_sleeps_between_runs_only() {
        let tmp = TempDir::new().unwrap();
        let mut orch = orchestrator(tmp.path());
        orch.config.loop_mode = Some(crate::config::LoopConfig {
            interval: Duration::from_secs(60),
            iterations: Some(2),
        });

        let mut stamps = vec![ts("20250106_100100"), ts("20250106_100000")];
        let summary = orch.run_loop(|| stamps.pop().unwrap()).unwrap();
        assert_eq!(summary, LoopSummary { completed: 2, failed: 0 });
        assert_eq!(orch.table().len(), 2);

        let slept = &orch.executor_mut().sleeper_mut().slept;
        assert_eq!(slept.iter().filter(|d| **d == Duration::from_secs(60)).count(), 1);
    }

    #[test]
    fn test_loop_counts_failed_runs_and_carries_on() {
        let tmp = TempDir::new().unwrap();
        let blocked = tmp.path().join("blocked");
        fs::write(&blocked, "not a directory").unwrap();
        let mut orch = orchestrator(&blocked);
        orch.config.loop_mode = Some(crate::config::LoopConfig {
            interval: Duration::from_secs(30),
            iterations: Some(3),
        });

        let summary = orch.run_loop(|| ts("20250106_100000")).unwrap();
        assert_eq!(summary, LoopSummary { completed: 0, failed: 3 });
        assert!(orch.table().is_empty());
        assert_eq!(orch.executor_mut().sleeper_mut().slept.len(), 2);
    }

    /// A historical run made against another server, laid out by hand
    fn write_historical_run(root: &Path) {
        let layout = ArtifactLayout::new(root);
        let stamp = "20250105_090000";
        let dir = layout.create_run_dir("unit", stamp).unwrap();
        let mut meta = RunMeta::new("unit", None, ts(stamp));
        meta.server = Some("198.51.100.7".to_string());
        meta.wan_target = Some("9.9.9.9".to_string());
        meta.write(&dir).unwrap();
        fs::write(
            dir.join(artifact_file_name(ProbeKind::TraceServer, "unit", stamp)),
            "traceroute to 198.51.100.7 (198.51.100.7), 30 hops max\n \
             1  192.168.1.1  1.0 ms\n 2  198.51.100.7  9.0 ms\n",
        )
        .unwrap();
    }

    #[test]
    fn test_resume_knows_servers_from_run_metadata() {
        let tmp = TempDir::new().unwrap();
        write_historical_run(tmp.path());

        let mut orch = orchestrator(tmp.path());
        assert_eq!(orch.resume().unwrap(), 1);
        let graph = orch.graph();
        assert_eq!(
            graph.node("198.51.100.7").unwrap().role,
            crate::topology::NodeRole::ProbeTarget
        );

        // Same graph as folding the scanned directories directly
        let hint = orch.hint();
        let runs: Vec<CollectedRun> = orch
            .layout()
            .discover_run_dirs(None)
            .unwrap()
            .iter()
            .map(|dir| collect_run(&scan_run_dir(dir).unwrap(), &hint).unwrap())
            .collect();
        let mut table = RunTable::new();
        let rules = role_rules(orch.config()).unwrap();
        let mut topology = TopologyBuilder::new(rules, orch.config().topology.client_id.clone());
        fold_series(&mut table, &mut topology, runs);
        assert_eq!(topology.build(), graph);
        assert_eq!(table.records(), orch.table().records());
    }

    #[test]
    fn test_resume_rebuilds_series() {
        let tmp = TempDir::new().unwrap();
        let mut first = orchestrator(tmp.path());
        first.run_once(ts("20250106_100000")).unwrap();

        let mut second = orchestrator(tmp.path());
        assert_eq!(second.resume().unwrap(), 1);
        assert_eq!(second.table().records(), first.table().records());
        assert_eq!(second.graph(), first.graph());
    }
}
