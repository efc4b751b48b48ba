//! Command builders for every probe a run issues.

use crate::config::{Config, InterfaceConfig, ProbeConfig};

use super::types::{CommandSpec, ProbeKind};

/// iperf3 `-J` output carries this key when the test could not run
pub const IPERF_ERROR_MARKERS: [&str; 1] = ["\"error\""];

/// Resolution failures reported by ping and traceroute
pub const RESOLVE_ERROR_MARKERS: [&str; 3] =
    ["unknown host", "cannot resolve", "Name or service not known"];

fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: ToString,
{
    items.into_iter().map(|s| s.to_string()).collect()
}

/// Bandwidth probe against the configured server.
///
/// Returns `None` for non-bandwidth kinds.
pub fn bandwidth(kind: ProbeKind, probes: &ProbeConfig) -> Option<CommandSpec> {
    let secs = probes.duration.as_secs().max(1).to_string();
    let udp_rate = format!("{}M", probes.udp_target_mbps);

    let mut argv = args(["-c", probes.server.as_str()]);
    match kind {
        ProbeKind::TcpDownload => argv.push("-R".to_string()),
        ProbeKind::TcpUpload => {}
        ProbeKind::UdpDownload => argv.extend(args(["-u", "-b", udp_rate.as_str(), "-R"])),
        ProbeKind::UdpUpload => argv.extend(args(["-u", "-b", udp_rate.as_str()])),
        _ => return None,
    }
    argv.extend(args(["-t", secs.as_str(), "-J"]));

    Some(CommandSpec::new(kind, &probes.iperf_path, argv).with_error_markers(IPERF_ERROR_MARKERS))
}

/// Latency probe with `count` echo requests
pub fn ping(kind: ProbeKind, target: &str, count: u32, probes: &ProbeConfig) -> CommandSpec {
    let count_flag = if cfg!(target_os = "windows") { "-n" } else { "-c" };
    CommandSpec::new(
        kind,
        &probes.ping_path,
        args([count_flag, count.to_string().as_str(), target]),
    )
    .with_error_markers(RESOLVE_ERROR_MARKERS)
}

/// Path discovery towards `target`; stderr carries the `traceroute to` header
pub fn traceroute(kind: ProbeKind, target: &str, probes: &ProbeConfig) -> CommandSpec {
    CommandSpec::new(
        kind,
        &probes.traceroute_path,
        args(["-m", probes.max_hops.to_string().as_str(), target]),
    )
    .with_error_markers(RESOLVE_ERROR_MARKERS)
    .with_stderr()
}

/// Routing table dump, if a command is configured
pub fn route_table(probes: &ProbeConfig) -> Option<CommandSpec> {
    let (program, rest) = probes.route_command.split_first()?;
    Some(CommandSpec::new(ProbeKind::RouteTable, program, rest.to_vec()))
}

/// One spec per configured interface snapshot command
pub fn interface_state(interface: &InterfaceConfig) -> Vec<CommandSpec> {
    interface
        .commands
        .iter()
        .filter_map(|cmd| cmd.split_first())
        .map(|(program, rest)| CommandSpec::new(ProbeKind::InterfaceState, program, rest.to_vec()))
        .collect()
}

/// Gateway and WAN latency probes sized from the configured duration
pub fn latency_pair(config: &Config, gateway: Option<&str>) -> Vec<CommandSpec> {
    let count = config.ping_count();
    let mut specs = Vec::with_capacity(2);
    if let Some(gw) = gateway {
        specs.push(ping(ProbeKind::PingGateway, gw, count, &config.probes));
    }
    specs.push(ping(ProbeKind::PingWan, &config.probes.wan_target, count, &config.probes));
    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn probes() -> ProbeConfig {
        ProbeConfig {
            server: "192.0.2.10".to_string(),
            duration: Duration::from_secs(10),
            udp_target_mbps: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_bandwidth_commands() {
        let p = probes();
        let line = |k| bandwidth(k, &p).unwrap().identity();
        assert_eq!(line(ProbeKind::TcpDownload), "iperf3 -c 192.0.2.10 -R -t 10 -J");
        assert_eq!(line(ProbeKind::TcpUpload), "iperf3 -c 192.0.2.10 -t 10 -J");
        assert_eq!(line(ProbeKind::UdpDownload), "iperf3 -c 192.0.2.10 -u -b 50M -R -t 10 -J");
        assert_eq!(line(ProbeKind::UdpUpload), "iperf3 -c 192.0.2.10 -u -b 50M -t 10 -J");
        assert!(bandwidth(ProbeKind::PingWan, &p).is_none());
    }

    #[test]
    fn test_bandwidth_carries_error_marker() {
        let spec = bandwidth(ProbeKind::UdpUpload, &probes()).unwrap();
        assert_eq!(spec.error_markers, vec!["\"error\"".to_string()]);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_latency_pair_counts() {
        let mut config = Config::default();
        config.probes = probes();
        let specs = latency_pair(&config, Some("192.168.1.1"));
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].identity(), "ping -c 50 192.168.1.1");
        assert_eq!(specs[1].identity(), "ping -c 50 8.8.8.8");

        let no_gw = latency_pair(&config, None);
        assert_eq!(no_gw.len(), 1);
        assert_eq!(no_gw[0].kind, ProbeKind::PingWan);
    }

    #[test]
    fn test_traceroute_captures_stderr() {
        let spec = traceroute(ProbeKind::TraceServer, "192.0.2.10", &probes());
        assert!(spec.capture_stderr);
        assert_eq!(spec.identity(), "traceroute -m 30 192.0.2.10");
    }

    #[test]
    fn test_route_and_interface_commands() {
        let mut p = probes();
        p.route_command = vec!["netstat".to_string(), "-nr".to_string()];
        assert_eq!(route_table(&p).unwrap().identity(), "netstat -nr");
        p.route_command.clear();
        assert!(route_table(&p).is_none());

        let iface = InterfaceConfig {
            commands: vec![vec!["iw".to_string(), "dev".to_string()], vec![]],
            ..Default::default()
        };
        let specs = interface_state(&iface);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].kind, ProbeKind::InterfaceState);
    }
}
