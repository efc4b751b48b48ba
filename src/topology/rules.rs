//! Node-role classification as an ordered table of (predicate, role) pairs.
//!
//! Rules are evaluated top-down and the first match wins. The default table
//! built by [`RoleRules::from_config`] uses this priority:
//!
//! 1. known measurement server -> probe-target
//! 2. known generic endpoint, or the trace destination -> endpoint
//! 3. trace source -> client
//! 4. inside a local subnet (and not the gateway) -> lan
//! 5. the default gateway -> gateway
//! 6. radio-vendor hostname -> radio
//! 7. satellite-vendor hostname -> satellite
//! 8. ISP hostname or provider block -> isp
//! 9. anything else -> wan

use std::net::IpAddr;

use regex::{Regex, RegexBuilder};

use super::types::NodeRole;
use crate::config::TopologyConfig;
use crate::utils::ip_utils::{is_private_ip, Cidr, CidrError};

/// Errors building a rule table
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    InvalidSubnet(#[from] CidrError),

    #[error("Invalid gateway address '{0}'")]
    InvalidGateway(String),
}

/// What a predicate can see about a node at first sight
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub id: &'a str,
    pub address: Option<IpAddr>,
    pub hostname: Option<&'a str>,
    pub is_source: bool,
    pub is_destination: bool,
}

impl<'a> NodeContext<'a> {
    pub fn new(id: &'a str, hostname: Option<&'a str>) -> Self {
        Self {
            id,
            address: id.parse().ok(),
            hostname,
            is_source: false,
            is_destination: false,
        }
    }

    fn is_identified_by(&self, identities: &[String]) -> bool {
        identities.iter().any(|known| {
            known.eq_ignore_ascii_case(self.id)
                || self.hostname.is_some_and(|h| known.eq_ignore_ascii_case(h))
        })
    }
}

/// Default gateway test: the configured address when known, otherwise a
/// private address ending in `.1` or a hostname containing "gateway"
#[derive(Debug, Clone, Default)]
pub struct GatewayMatcher {
    pub address: Option<IpAddr>,
}

impl GatewayMatcher {
    pub fn matches(&self, ctx: &NodeContext) -> bool {
        if let Some(gw) = self.address {
            return ctx.address == Some(gw);
        }
        let Some(addr) = ctx.address else {
            return false;
        };
        is_private_ip(&addr)
            && (ctx.id.ends_with(".1")
                || ctx.hostname.is_some_and(|h| h.to_ascii_lowercase().contains("gateway")))
    }
}

/// One classification condition
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Identity or hostname equals one of these (case-insensitive)
    KnownIdentity(Vec<String>),
    /// Known identity, or the node is the trace's destination
    KnownOrDestination(Vec<String>),
    TraceSource,
    /// Address inside one of the subnets and not the gateway
    LocalSubnet {
        subnets: Vec<Cidr>,
        gateway: GatewayMatcher,
    },
    Gateway(GatewayMatcher),
    /// Hostname (or identity) matches any pattern
    NamePattern(Vec<Regex>),
    AddressIn(Vec<Cidr>),
    Always,
}

impl Predicate {
    pub fn matches(&self, ctx: &NodeContext) -> bool {
        match self {
            Predicate::KnownIdentity(ids) => ctx.is_identified_by(ids),
            Predicate::KnownOrDestination(ids) => ctx.is_destination || ctx.is_identified_by(ids),
            Predicate::TraceSource => ctx.is_source,
            Predicate::LocalSubnet { subnets, gateway } => {
                ctx.address
                    .is_some_and(|addr| subnets.iter().any(|s| s.contains(&addr)))
                    && !gateway.matches(ctx)
            }
            Predicate::Gateway(gateway) => gateway.matches(ctx),
            Predicate::NamePattern(patterns) => {
                let name = ctx.hostname.unwrap_or(ctx.id);
                patterns.iter().any(|re| re.is_match(name) || re.is_match(ctx.id))
            }
            Predicate::AddressIn(subnets) => ctx
                .address
                .is_some_and(|addr| subnets.iter().any(|s| s.contains(&addr))),
            Predicate::Always => true,
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, RuleError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|source| RuleError::InvalidPattern {
                    pattern: p.clone(),
                    source,
                })
        })
        .collect()
}

fn parse_subnets(subnets: &[String]) -> Result<Vec<Cidr>, RuleError> {
    subnets
        .iter()
        .map(|s| s.parse::<Cidr>().map_err(RuleError::from))
        .collect()
}

/// Ordered rule table; the last rule should always match
#[derive(Debug, Clone)]
pub struct RoleRules {
    rules: Vec<(Predicate, NodeRole)>,
}

impl RoleRules {
    pub fn new(rules: Vec<(Predicate, NodeRole)>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[(Predicate, NodeRole)] {
        &self.rules
    }

    /// Build the standard table from topology settings
    pub fn from_config(config: &TopologyConfig) -> Result<Self, RuleError> {
        let gateway = GatewayMatcher {
            address: config
                .default_gateway
                .as_deref()
                .map(|gw| {
                    gw.parse::<IpAddr>()
                        .map_err(|_| RuleError::InvalidGateway(gw.to_string()))
                })
                .transpose()?,
        };

        let isp_subnets = parse_subnets(&config.isp_subnets)?;

        let mut rules = vec![
            (
                Predicate::KnownIdentity(config.measurement_servers.clone()),
                NodeRole::ProbeTarget,
            ),
            (
                Predicate::KnownOrDestination(config.endpoints.clone()),
                NodeRole::Endpoint,
            ),
            (Predicate::TraceSource, NodeRole::Client),
            (
                Predicate::LocalSubnet {
                    subnets: parse_subnets(&config.local_subnets)?,
                    gateway: gateway.clone(),
                },
                NodeRole::Lan,
            ),
            (Predicate::Gateway(gateway), NodeRole::Gateway),
            (
                Predicate::NamePattern(compile_patterns(&config.radio_patterns)?),
                NodeRole::Radio,
            ),
            (
                Predicate::NamePattern(compile_patterns(&config.satellite_patterns)?),
                NodeRole::Satellite,
            ),
            (
                Predicate::NamePattern(compile_patterns(&config.isp_patterns)?),
                NodeRole::Isp,
            ),
        ];
        if !isp_subnets.is_empty() {
            rules.push((Predicate::AddressIn(isp_subnets), NodeRole::Isp));
        }
        rules.push((Predicate::Always, NodeRole::Wan));

        Ok(Self { rules })
    }

    /// Adopt a detected default gateway for matchers that have no configured
    /// address yet. Returns true when any matcher changed.
    pub fn detect_gateway(&mut self, address: IpAddr) -> bool {
        let mut changed = false;
        for (predicate, _) in &mut self.rules {
            let matcher = match predicate {
                Predicate::Gateway(m) | Predicate::LocalSubnet { gateway: m, .. } => m,
                _ => continue,
            };
            if matcher.address.is_none() {
                matcher.address = Some(address);
                changed = true;
            }
        }
        changed
    }

    /// Extend the known measurement servers and generic endpoints. Nodes
    /// already classified keep their role.
    pub fn learn_identities(&mut self, servers: &[String], endpoints: &[String]) {
        for (predicate, role) in &mut self.rules {
            let (known, learned) = match (predicate, *role) {
                (Predicate::KnownIdentity(ids), NodeRole::ProbeTarget) => (ids, servers),
                (Predicate::KnownOrDestination(ids), NodeRole::Endpoint) => (ids, endpoints),
                _ => continue,
            };
            for id in learned {
                if !id.is_empty() && !known.iter().any(|k| k.eq_ignore_ascii_case(id)) {
                    known.push(id.clone());
                }
            }
        }
    }

    /// Role of the first matching rule; `Wan` when nothing matches
    pub fn classify(&self, ctx: &NodeContext) -> NodeRole {
        self.rules
            .iter()
            .find(|(predicate, _)| predicate.matches(ctx))
            .map(|(_, role)| *role)
            .unwrap_or(NodeRole::Wan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RoleRules {
        let config = TopologyConfig {
            measurement_servers: vec!["203.0.113.5".to_string()],
            endpoints: vec!["8.8.8.8".to_string()],
            isp_subnets: vec!["68.86.0.0/16".to_string()],
            ..Default::default()
        };
        RoleRules::from_config(&config).unwrap()
    }

    fn ctx<'a>(id: &'a str, hostname: Option<&'a str>) -> NodeContext<'a> {
        NodeContext::new(id, hostname)
    }

    #[test]
    fn test_learned_identities_extend_known_roles() {
        let mut r = rules();
        assert_eq!(r.classify(&ctx("198.51.100.7", None)), NodeRole::Wan);

        r.learn_identities(&["198.51.100.7".to_string()], &["1.1.1.1".to_string()]);
        assert_eq!(r.classify(&ctx("198.51.100.7", None)), NodeRole::ProbeTarget);
        assert_eq!(r.classify(&ctx("1.1.1.1", None)), NodeRole::Endpoint);
        assert_eq!(r.classify(&ctx("203.0.113.5", None)), NodeRole::ProbeTarget);
    }

    #[test]
    fn test_each_rule_in_isolation() {
        let r = rules();
        assert_eq!(r.classify(&ctx("203.0.113.5", None)), NodeRole::ProbeTarget);
        assert_eq!(r.classify(&ctx("8.8.8.8", Some("dns.google"))), NodeRole::Endpoint);

        let mut source = ctx("client", None);
        source.is_source = true;
        assert_eq!(r.classify(&source), NodeRole::Client);

        assert_eq!(r.classify(&ctx("192.168.1.23", None)), NodeRole::Lan);
        assert_eq!(r.classify(&ctx("192.168.1.1", None)), NodeRole::Gateway);
        assert_eq!(r.classify(&ctx("10.0.0.9", Some("home-gateway.lan"))), NodeRole::Gateway);
        assert_eq!(r.classify(&ctx("100.64.0.2", Some("silvus-node-3"))), NodeRole::Radio);
        assert_eq!(r.classify(&ctx("100.64.1.2", Some("gw.viasat.net"))), NodeRole::Satellite);
        assert_eq!(r.classify(&ctx("96.1.2.3", Some("be-10.comcast.net"))), NodeRole::Isp);
        assert_eq!(r.classify(&ctx("68.86.4.4", None)), NodeRole::Isp);
        assert_eq!(r.classify(&ctx("1.2.3.4", Some("core1.example.org"))), NodeRole::Wan);
    }

    #[test]
    fn test_destination_is_endpoint_unless_measurement_server() {
        let r = rules();
        let mut dest = ctx("1.1.1.1", None);
        dest.is_destination = true;
        assert_eq!(r.classify(&dest), NodeRole::Endpoint);

        let mut server = ctx("203.0.113.5", None);
        server.is_destination = true;
        assert_eq!(r.classify(&server), NodeRole::ProbeTarget);
    }

    #[test]
    fn test_configured_gateway_replaces_heuristic() {
        let config = TopologyConfig {
            default_gateway: Some("192.168.1.254".to_string()),
            ..Default::default()
        };
        let r = RoleRules::from_config(&config).unwrap();
        assert_eq!(r.classify(&ctx("192.168.1.254", None)), NodeRole::Gateway);
        assert_eq!(r.classify(&ctx("192.168.1.1", None)), NodeRole::Lan);
    }

    #[test]
    fn test_detected_gateway_fills_unconfigured_matchers() {
        let mut r = rules();
        assert!(r.detect_gateway("10.0.0.138".parse().unwrap()));
        assert_eq!(r.classify(&ctx("10.0.0.138", None)), NodeRole::Gateway);
        assert_eq!(r.classify(&ctx("192.168.1.1", None)), NodeRole::Lan);
        // The first detection sticks
        assert!(!r.detect_gateway("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_priority_order_first_match_wins() {
        // A measurement server inside the LAN is still a probe target
        let config = TopologyConfig {
            measurement_servers: vec!["192.168.1.50".to_string()],
            ..Default::default()
        };
        let r = RoleRules::from_config(&config).unwrap();
        assert_eq!(r.classify(&ctx("192.168.1.50", None)), NodeRole::ProbeTarget);
    }

    #[test]
    fn test_pattern_words_do_not_overmatch() {
        let r = rules();
        // "sat" and "att" are whole-word patterns
        assert_eq!(r.classify(&ctx("1.2.3.4", Some("saturn.example.org"))), NodeRole::Wan);
        assert_eq!(r.classify(&ctx("1.2.3.5", Some("battery.example.org"))), NodeRole::Wan);
        assert_eq!(r.classify(&ctx("1.2.3.6", Some("cr1.att.net"))), NodeRole::Isp);
    }

    #[test]
    fn test_custom_table() {
        let r = RoleRules::new(vec![(Predicate::Always, NodeRole::Radio)]);
        assert_eq!(r.classify(&ctx("anything", None)), NodeRole::Radio);
        assert_eq!(RoleRules::new(vec![]).classify(&ctx("x", None)), NodeRole::Wan);
    }

    #[test]
    fn test_bad_inputs_rejected() {
        let bad_pattern = TopologyConfig {
            radio_patterns: vec!["(".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            RoleRules::from_config(&bad_pattern),
            Err(RuleError::InvalidPattern { .. })
        ));

        let bad_subnet = TopologyConfig {
            local_subnets: vec!["10.0.0.0".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            RoleRules::from_config(&bad_subnet),
            Err(RuleError::InvalidSubnet(_))
        ));
    }
}
