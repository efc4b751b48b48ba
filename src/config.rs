use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::probe::RetryPolicy;
use crate::utils::ip_utils::Cidr;

/// Top-level measurement configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_mode: Option<LoopConfig>,
    #[serde(default)]
    pub interface: InterfaceConfig,
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.general.test_id.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral(
                "test_id cannot be empty".to_string(),
            ));
        }
        if self.general.test_id.contains(['/', '\\']) {
            return Err(ValidationError::InvalidGeneral(format!(
                "test_id '{}' must not contain path separators",
                self.general.test_id
            )));
        }

        let probes = &self.probes;
        if probes.server.trim().is_empty() {
            return Err(ValidationError::InvalidProbes(
                "server cannot be empty".to_string(),
            ));
        }
        if probes.duration.is_zero() {
            return Err(ValidationError::InvalidProbes(
                "duration must be greater than zero".to_string(),
            ));
        }
        if probes.udp_target_mbps == 0 {
            return Err(ValidationError::InvalidProbes(
                "udp_target_mbps must be greater than zero".to_string(),
            ));
        }
        if probes.ping_rate_hz == 0 {
            return Err(ValidationError::InvalidProbes(
                "ping_rate_hz must be greater than zero".to_string(),
            ));
        }
        if probes.wan_target.trim().is_empty() {
            return Err(ValidationError::InvalidProbes(
                "wan_target cannot be empty".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::InvalidRetry(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay > self.retry.cap {
            return Err(ValidationError::InvalidRetry(format!(
                "base_delay {:?} exceeds cap {:?}",
                self.retry.base_delay, self.retry.cap
            )));
        }

        if let Some(loop_mode) = &self.loop_mode {
            if loop_mode.iterations == Some(0) {
                return Err(ValidationError::InvalidLoop(
                    "iterations must be at least 1 when set".to_string(),
                ));
            }
        }

        self.topology.validate()?;

        Ok(())
    }

    /// Number of latency samples requested per ping probe:
    /// `duration_secs * ping_rate_hz`.
    pub fn ping_count(&self) -> u32 {
        let secs = self.probes.duration.as_secs().max(1) as u32;
        secs.saturating_mul(self.probes.ping_rate_hz).max(1)
    }
}

/// Run identity and output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub test_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_name: Option<String>,
    pub artifacts_root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            test_id: String::new(),
            run_name: None,
            artifacts_root: PathBuf::from("results"),
            log_level: None,
        }
    }
}

/// Probe tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Measurement server (bandwidth peer and path-discovery target)
    pub server: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub udp_target_mbps: u32,
    /// Generic external target for latency and path discovery
    pub wan_target: String,
    /// Latency samples per second of test duration
    pub ping_rate_hz: u32,
    pub iperf_path: String,
    pub ping_path: String,
    pub traceroute_path: String,
    pub max_hops: u32,
    /// Optional per-invocation kill timeout
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<Duration>,
    /// Command dumping the routing table (for default gateway discovery)
    pub route_command: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            duration: Duration::from_secs(30),
            udp_target_mbps: 100,
            wan_target: "8.8.8.8".to_string(),
            ping_rate_hz: 5,
            iperf_path: "iperf3".to_string(),
            ping_path: "ping".to_string(),
            traceroute_path: "traceroute".to_string(),
            max_hops: 30,
            command_timeout: None,
            route_command: default_route_command(),
        }
    }
}

fn default_route_command() -> Vec<String> {
    let cmd: &[&str] = if cfg!(target_os = "linux") {
        &["ip", "route", "show", "default"]
    } else {
        &["netstat", "-nr"]
    };
    cmd.iter().map(|s| s.to_string()).collect()
}

/// Loop mode: repeat runs with an inter-run wait
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Stop after this many runs; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

/// Active interface hint and snapshot commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Device name of the interface under test, e.g. "en0"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hardware-port label, e.g. "Wi-Fi"; overrides what the raw text says
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hardware_port: Option<String>,
    /// Commands whose concatenated output forms the interface snapshot
    pub commands: Vec<Vec<String>>,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            name: None,
            hardware_port: None,
            commands: default_interface_commands(),
        }
    }
}

fn default_interface_commands() -> Vec<Vec<String>> {
    let cmds: &[&[&str]] = if cfg!(target_os = "macos") {
        &[
            &["networksetup", "-listallhardwareports"],
            &[
                "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport",
                "-I",
            ],
        ]
    } else if cfg!(target_os = "windows") {
        &[&["netsh", "wlan", "show", "interfaces"]]
    } else {
        &[&["ip", "-o", "link", "show"], &["iw", "dev"]]
    };
    cmds.iter()
        .map(|c| c.iter().map(|s| s.to_string()).collect())
        .collect()
}

/// Inputs to node-role classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Identity of the trace source node
    pub client_id: String,
    /// Addresses or hostnames of measurement servers (role probe-target)
    pub measurement_servers: Vec<String>,
    /// Addresses or hostnames of generic external targets (role endpoint)
    pub endpoints: Vec<String>,
    /// CIDRs considered local (role lan)
    pub local_subnets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_gateway: Option<String>,
    /// Case-insensitive hostname patterns
    pub radio_patterns: Vec<String>,
    pub satellite_patterns: Vec<String>,
    pub isp_patterns: Vec<String>,
    /// Provider address blocks (role isp)
    pub isp_subnets: Vec<String>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let strings = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            client_id: "client".to_string(),
            measurement_servers: Vec::new(),
            endpoints: Vec::new(),
            local_subnets: strings(&["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16"]),
            default_gateway: None,
            radio_patterns: strings(&["silvus", "radio", "mesh"]),
            satellite_patterns: strings(&["viasat", "starlink", "hughes", "satellite", r"\bsat\b"]),
            isp_patterns: strings(&[
                r"\bisp\b",
                "comcast",
                r"\batt\b",
                "verizon",
                "spectrum",
                "charter",
                "cox",
            ]),
            isp_subnets: Vec::new(),
        }
    }
}

impl TopologyConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.client_id.trim().is_empty() {
            return Err(ValidationError::InvalidTopology(
                "client_id cannot be empty".to_string(),
            ));
        }
        for cidr in self.local_subnets.iter().chain(&self.isp_subnets) {
            cidr.parse::<Cidr>()
                .map_err(|e| ValidationError::InvalidTopology(e.to_string()))?;
        }
        if let Some(gw) = &self.default_gateway {
            if gw.parse::<std::net::IpAddr>().is_err() {
                return Err(ValidationError::InvalidTopology(format!(
                    "default_gateway '{}' is not an IP address",
                    gw
                )));
            }
        }
        for pattern in self
            .radio_patterns
            .iter()
            .chain(&self.satellite_patterns)
            .chain(&self.isp_patterns)
        {
            regex::Regex::new(pattern).map_err(|e| {
                ValidationError::InvalidTopology(format!("pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid probe configuration: {0}")]
    InvalidProbes(String),
    #[error("Invalid retry configuration: {0}")]
    InvalidRetry(String),
    #[error("Invalid loop configuration: {0}")]
    InvalidLoop(String),
    #[error("Invalid topology configuration: {0}")]
    InvalidTopology(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.general.test_id = "NIC_A_Pos0".to_string();
        config.probes.server = "192.0.2.10".to_string();
        config
    }

    #[test]
    fn test_defaults_need_server_and_test_id() {
        assert!(Config::default().validate().is_err());
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_ping_count_is_five_per_second() {
        let mut config = valid();
        config.probes.duration = Duration::from_secs(10);
        assert_eq!(config.ping_count(), 50);
    }

    #[test]
    fn test_retry_base_above_cap_rejected() {
        let mut config = valid();
        config.retry.base_delay = Duration::from_secs(32);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidRetry(_))));
    }

    #[test]
    fn test_bad_cidr_rejected() {
        let mut config = valid();
        config.topology.local_subnets = vec!["192.168.1.0/40".to_string()];
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTopology(_))));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = valid();
        config.topology.radio_patterns = vec!["(unclosed".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let mut config = valid();
        config.loop_mode = Some(LoopConfig {
            interval: Duration::from_secs(60),
            iterations: Some(0),
        });
        assert!(matches!(config.validate(), Err(ValidationError::InvalidLoop(_))));
    }

    #[test]
    fn test_parse_yaml_with_durations() {
        let yaml = r#"
general:
  test_id: "NIC_A_Pos0"
probes:
  server: "192.0.2.10"
  duration: 10s
  udp_target_mbps: 50
retry:
  max_attempts: 4
loop_mode:
  interval: 2m
  iterations: 3
topology:
  measurement_servers: ["192.0.2.10"]
  default_gateway: "192.168.1.1"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.probes.duration, Duration::from_secs(10));
        assert_eq!(config.probes.wan_target, "8.8.8.8");
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.cap, Duration::from_secs(16));
        assert_eq!(config.loop_mode.unwrap().interval, Duration::from_secs(120));
        assert_eq!(config.topology.client_id, "client");
    }
}
