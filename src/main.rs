use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use env_logger::Env;
use log::{info, warn};

use netprobe::config::Config;
use netprobe::config_loader::{self, CliOverrides};
use netprobe::orchestrator::Orchestrator;

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Run network measurement probes against a server and keep the artifacts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Measurement server (iperf3 peer and traceroute target)
    #[arg(short, long)]
    server: Option<String>,

    /// Test identity used in artifact directory names
    #[arg(short = 'i', long)]
    test_id: Option<String>,

    /// Optional run name recorded alongside the test id
    #[arg(long)]
    run_name: Option<String>,

    /// Probe duration, e.g. "30s"
    #[arg(short, long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// UDP target bandwidth in Mbps
    #[arg(long)]
    udp_target_mbps: Option<u32>,

    /// Root directory for run artifacts and cumulative outputs
    #[arg(short, long)]
    artifacts_root: Option<PathBuf>,

    /// Repeat runs with this pause between them, e.g. "5m"
    #[arg(long, value_parser = parse_duration)]
    loop_interval: Option<Duration>,

    /// Stop loop mode after this many runs
    #[arg(long)]
    iterations: Option<u32>,

    /// Start a fresh series instead of folding in earlier runs
    #[arg(long)]
    no_resume: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            server: self.server.clone(),
            test_id: self.test_id.clone(),
            run_name: self.run_name.clone(),
            duration: self.duration,
            udp_target_mbps: self.udp_target_mbps,
            artifacts_root: self.artifacts_root.clone(),
            loop_interval: self.loop_interval,
            iterations: self.iterations,
        }
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config_loader::read_config(path)?,
        None => Config::default(),
    };

    let level = args
        .log_level
        .clone()
        .or_else(|| config.general.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    config_loader::apply_cli_overrides(&mut config, &args.overrides())?;

    info!("Starting netprobe");
    info!("Test id: {}", config.general.test_id);
    info!("Server: {}", config.probes.server);
    info!("Artifacts root: {:?}", config.general.artifacts_root);

    let mut orchestrator = Orchestrator::from_config(config)?;
    if !args.no_resume {
        orchestrator.resume()?;
    }

    let summary = orchestrator.run_loop(|| chrono::Local::now().naive_local())?;

    info!(
        "Completed {} run(s), {} failed; series now holds {} runs",
        summary.completed,
        summary.failed,
        orchestrator.table().len()
    );
    if let Some(warning) = orchestrator.table().assess_quality() {
        warn!("{}", warning);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from([
            "netprobe",
            "--server", "192.0.2.10",
            "--test-id", "NIC_A",
            "--duration", "10s",
            "--loop-interval", "5m",
            "--iterations", "3",
        ]);

        assert_eq!(args.server.as_deref(), Some("192.0.2.10"));
        assert_eq!(args.duration, Some(Duration::from_secs(10)));
        assert_eq!(args.loop_interval, Some(Duration::from_secs(300)));
        assert!(args.config.is_none());
        assert!(!args.no_resume);

        let mut config = Config::default();
        config_loader::apply_cli_overrides(&mut config, &args.overrides()).unwrap();
        assert_eq!(config.loop_mode.unwrap().iterations, Some(3));
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(Args::try_parse_from(["netprobe", "--duration", "soon"]).is_err());
    }
}
