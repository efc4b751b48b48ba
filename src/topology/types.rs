use serde::{Deserialize, Serialize};

/// Classified function of a node in the discovered topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    Client,
    Lan,
    Gateway,
    Radio,
    Satellite,
    Isp,
    Wan,
    ProbeTarget,
    Endpoint,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Client => "client",
            NodeRole::Lan => "lan",
            NodeRole::Gateway => "gateway",
            NodeRole::Radio => "radio",
            NodeRole::Satellite => "satellite",
            NodeRole::Isp => "isp",
            NodeRole::Wan => "wan",
            NodeRole::ProbeTarget => "probe-target",
            NodeRole::Endpoint => "endpoint",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// A node of the cumulative graph; identity is its address (or hostname)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Assigned at first sight and never changed
    pub role: NodeRole,
    pub first_seen_run: String,
    /// Number of traces the node appeared in
    pub appearances: u32,
    #[serde(default)]
    pub rtt_samples_ms: Vec<f64>,
}

impl TopologyNode {
    pub fn avg_rtt_ms(&self) -> Option<f64> {
        mean(&self.rtt_samples_ms)
    }

    /// Hostname when known, else the identity
    pub fn label(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.id)
    }
}

/// Display bucket for edge usage counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageTier {
    Single,
    Dual,
    Heavy,
}

impl UsageTier {
    pub fn from_count(count: u64) -> Self {
        match count {
            0 | 1 => UsageTier::Single,
            2 => UsageTier::Dual,
            _ => UsageTier::Heavy,
        }
    }
}

/// Directed edge with exact usage count and every RTT sample seen on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
    pub usage_count: u64,
    #[serde(default)]
    pub rtt_samples_ms: Vec<f64>,
}

impl TopologyEdge {
    /// Mean over all accumulated samples, not just the latest trace
    pub fn avg_rtt_ms(&self) -> Option<f64> {
        mean(&self.rtt_samples_ms)
    }

    pub fn usage_tier(&self) -> UsageTier {
        UsageTier::from_count(self.usage_count)
    }
}

/// Built graph, nodes and edges in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<TopologyNode>,
    pub edges: Vec<TopologyEdge>,
    pub traces_ingested: usize,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&TopologyNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&TopologyEdge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn nodes_with_role(&self, role: NodeRole) -> impl Iterator<Item = &TopologyNode> {
        self.nodes.iter().filter(move |n| n.role == role)
    }
}
