//! Offline analysis of existing netprobe artifact directories.
//!
//! Rebuilds the run table and the cumulative topology from run directories
//! on disk, and writes the tabular export, the graph and a text report.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use rayon::prelude::*;

use netprobe::aggregate::{collect_run, write_csv, write_json, CollectedRun, RunTable};
use netprobe::artifacts::layout::scan_run_dir;
use netprobe::artifacts::ArtifactLayout;
use netprobe::config::Config;
use netprobe::config_loader;
use netprobe::interface::InterfaceHint;
use netprobe::orchestrator::{
    fold_series, role_rules, write_series_outputs, TOPOLOGY_DOT, TOPOLOGY_JSON,
};
use netprobe::report::{self, AnalysisReport};
use netprobe::topology::{generate_dot, Graph, TopologyBuilder};

#[derive(Parser)]
#[command(name = "probe-analyzer")]
#[command(about = "Offline analysis of netprobe artifact directories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory holding artifacts_* run directories
    #[arg(short, long, default_value = "results")]
    artifacts_root: PathBuf,

    /// Output directory for tables, graphs and reports
    #[arg(short, long, default_value = "analysis_output")]
    outdir: PathBuf,

    /// Only analyze run directories whose name contains this text
    #[arg(short, long)]
    filter: Option<String>,

    /// Configuration file supplying topology rules and interface hints
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = auto-detect)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the run table (summary.csv / summary.json)
    Summary,

    /// Rebuild the cumulative topology graph (topology.json / topology.dot)
    Topology {
        /// Graph title
        #[arg(long, default_value = "Network Topology")]
        title: String,
    },

    /// Table, graph and text/JSON report
    Full {
        /// Graph title
        #[arg(long, default_value = "Network Topology")]
        title: String,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    // Set thread pool size
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    let config = match &cli.config {
        Some(path) => config_loader::read_config(path)?,
        None => Config::default(),
    };
    let hint = InterfaceHint {
        name: config.interface.name.clone(),
        hardware_port: config.interface.hardware_port.clone(),
    };

    log::info!("Scanning {}...", cli.artifacts_root.display());
    let runs = load_runs(&cli.artifacts_root, cli.filter.as_deref(), &hint)?;
    log::info!("Loaded {} runs", runs.len());

    let (table, graph) = fold_runs(runs, &config)?;

    fs::create_dir_all(&cli.outdir)
        .with_context(|| format!("Failed to create output directory: {}", cli.outdir.display()))?;

    match cli.command {
        Commands::Summary => {
            write_csv(&cli.outdir.join("summary.csv"), table.records())?;
            write_json(&cli.outdir.join("summary.json"), table.records())?;
            let report = AnalysisReport::new(&cli.artifacts_root, table.records().to_vec(), None);
            print_lines(&report::summary_lines(&report));
        }
        Commands::Topology { title } => {
            write_graph(&cli.outdir, &graph, &title)?;
            println!(
                "Topology: {} nodes, {} edges from {} traces",
                graph.nodes.len(),
                graph.edges.len(),
                graph.traces_ingested
            );
        }
        Commands::Full { title } => {
            write_series_outputs(&cli.outdir, table.records(), &graph, &title)?;
            let report =
                AnalysisReport::new(&cli.artifacts_root, table.records().to_vec(), Some(graph));
            report::generate_json_report(&report, &cli.outdir.join("report.json"))?;
            report::generate_text_report(&report, &cli.outdir.join("report.txt"))?;
            print_lines(&report::summary_lines(&report));
        }
    }

    log::info!("Outputs written to {}", cli.outdir.display());
    Ok(())
}

/// Parse run directories in parallel; results keep directory order
fn load_runs(root: &Path, filter: Option<&str>, hint: &InterfaceHint) -> Result<Vec<CollectedRun>> {
    let dirs = ArtifactLayout::new(root).discover_run_dirs(filter)?;

    let parsed: Vec<(PathBuf, Result<CollectedRun>)> = dirs
        .into_par_iter()
        .map(|dir| {
            let result = scan_run_dir(&dir).and_then(|run| collect_run(&run, hint));
            (dir, result)
        })
        .collect();

    let mut runs = Vec::with_capacity(parsed.len());
    for (dir, result) in parsed {
        match result {
            Ok(run) => runs.push(run),
            Err(e) => log::warn!("Skipping {}: {:#}", dir.display(), e),
        }
    }
    Ok(runs)
}

/// Fold runs with the same role rules `netprobe` uses for the config, so
/// both tools produce the same graph from the same directories
fn fold_runs(runs: Vec<CollectedRun>, config: &Config) -> Result<(RunTable, Graph)> {
    let rules = role_rules(config)?;
    let mut builder = TopologyBuilder::new(rules, config.topology.client_id.clone());
    let mut table = RunTable::new();
    fold_series(&mut table, &mut builder, runs);
    Ok((table, builder.build()))
}

fn write_graph(outdir: &Path, graph: &Graph, title: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(graph).context("Failed to serialize topology")?;
    let json_path = outdir.join(TOPOLOGY_JSON);
    fs::write(&json_path, json).with_context(|| format!("Failed to write {}", json_path.display()))?;

    let dot_path = outdir.join(TOPOLOGY_DOT);
    fs::write(&dot_path, generate_dot(graph, title))
        .with_context(|| format!("Failed to write {}", dot_path.display()))?;
    Ok(())
}

fn print_lines(lines: &[String]) {
    println!();
    for line in lines {
        println!("{}", line);
    }
    println!();
}
