//! Default gateway discovery from routing-table dumps.

use std::sync::LazyLock;

use regex::Regex;

use crate::utils::ip_utils::is_valid_ip;

/// Match, in order: `ip route` ("default via X"), BSD `netstat -nr`
/// ("default X"), `route -n` ("0.0.0.0 X"), Windows `ipconfig`
/// ("Default Gateway . . . : X")
static GATEWAY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*default\s+via\s+([0-9A-Fa-f.:]+)",
        r"^\s*default\s+([0-9A-Fa-f.:]+)",
        r"^\s*0\.0\.0\.0\s+(\d{1,3}(?:\.\d{1,3}){3})",
        r"Default Gateway[ .]*:\s*(\d{1,3}(?:\.\d{1,3}){3})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid gateway regex"))
    .collect()
});

/// First default-route next hop found in `route_text`, if any.
pub fn extract_default_gateway(route_text: &str) -> Option<String> {
    route_text.lines().find_map(|line| {
        GATEWAY_PATTERNS.iter().find_map(|re| {
            let candidate = re.captures(line)?.get(1)?.as_str();
            // "0.0.0.0" shows up as the gateway of on-link routes
            (is_valid_ip(candidate) && candidate != "0.0.0.0").then(|| candidate.to_string())
        })
    })
}
