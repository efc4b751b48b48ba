use crate::config::Config;
use color_eyre::eyre::{Context, Result};
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parse a YAML configuration file without validating it.
///
/// Useful when CLI flags are expected to fill in required fields.
pub fn read_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open config file {:?}", config_path))?;

    let config: Config = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse config file {:?}", config_path))?;

    Ok(config)
}

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    let config = read_config(config_path)?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

/// CLI arguments that can override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub test_id: Option<String>,
    pub run_name: Option<String>,
    pub duration: Option<Duration>,
    pub udp_target_mbps: Option<u32>,
    pub artifacts_root: Option<PathBuf>,
    pub loop_interval: Option<Duration>,
    pub iterations: Option<u32>,
}

/// Apply CLI overrides to a configuration, then re-validate
pub fn apply_cli_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(server) = &overrides.server {
        info!("Overriding server: {}", server);
        config.probes.server = server.clone();
    }
    if let Some(test_id) = &overrides.test_id {
        config.general.test_id = test_id.clone();
    }
    if let Some(run_name) = &overrides.run_name {
        config.general.run_name = Some(run_name.clone());
    }
    if let Some(duration) = overrides.duration {
        info!("Overriding probe duration: {:?}", duration);
        config.probes.duration = duration;
    }
    if let Some(mbps) = overrides.udp_target_mbps {
        config.probes.udp_target_mbps = mbps;
    }
    if let Some(root) = &overrides.artifacts_root {
        config.general.artifacts_root = root.clone();
    }

    // Loop mode is enabled by an interval; an iteration cap alone tightens an existing loop
    if let Some(interval) = overrides.loop_interval {
        let iterations = overrides
            .iterations
            .or_else(|| config.loop_mode.as_ref().and_then(|l| l.iterations));
        config.loop_mode = Some(crate::config::LoopConfig { interval, iterations });
    } else if let (Some(iterations), Some(loop_mode)) =
        (overrides.iterations, config.loop_mode.as_mut())
    {
        loop_mode.iterations = Some(iterations);
    }

    config.validate().context("Configuration invalid after CLI overrides")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const YAML: &str = r#"
general:
  test_id: "NIC_A_Pos0"
  artifacts_root: "out"
probes:
  server: "192.0.2.10"
  duration: 10s
loop_mode:
  interval: 5m
  iterations: 4
"#;

    #[test]
    fn test_load_config() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.test_id, "NIC_A_Pos0");
        assert_eq!(config.general.artifacts_root, PathBuf::from("out"));
        assert_eq!(config.ping_count(), 50);
    }

    #[test]
    fn test_load_config_rejects_missing_server() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "general:\n  test_id: x\n").unwrap();

        assert!(load_config(temp_file.path()).is_err());
        // Unvalidated read still works so CLI flags can fill the gap
        assert!(read_config(temp_file.path()).is_ok());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_config(Path::new("/nonexistent/netprobe.yaml")).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", YAML).unwrap();
        let mut config = load_config(temp_file.path()).unwrap();

        let overrides = CliOverrides {
            server: Some("198.51.100.7".to_string()),
            duration: Some(Duration::from_secs(20)),
            iterations: Some(2),
            ..Default::default()
        };
        apply_cli_overrides(&mut config, &overrides).unwrap();

        assert_eq!(config.probes.server, "198.51.100.7");
        assert_eq!(config.probes.duration, Duration::from_secs(20));
        let loop_mode = config.loop_mode.unwrap();
        assert_eq!(loop_mode.interval, Duration::from_secs(300));
        assert_eq!(loop_mode.iterations, Some(2));
    }

    #[test]
    fn test_overrides_complete_default_config() {
        let mut config = Config::default();
        let overrides = CliOverrides {
            server: Some("192.0.2.10".to_string()),
            test_id: Some("bench".to_string()),
            loop_interval: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        apply_cli_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.loop_mode.unwrap().iterations, None);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = Config::default();
        let overrides = CliOverrides {
            server: Some("192.0.2.10".to_string()),
            test_id: Some("bench".to_string()),
            udp_target_mbps: Some(0),
            ..Default::default()
        };
        assert!(apply_cli_overrides(&mut config, &overrides).is_err());
    }
}
