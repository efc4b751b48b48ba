//! GraphViz DOT output for the topology graph.

use super::types::{Graph, NodeRole, UsageTier};

fn role_color(role: NodeRole) -> &'static str {
    match role {
        NodeRole::Client => "lightgreen",
        NodeRole::Lan => "lightgray",
        NodeRole::Gateway => "gold",
        NodeRole::Radio => "orange",
        NodeRole::Satellite => "plum",
        NodeRole::Isp => "lightblue",
        NodeRole::Wan => "white",
        NodeRole::ProbeTarget => "tomato",
        NodeRole::Endpoint => "salmon",
    }
}

fn tier_penwidth(tier: UsageTier) -> f64 {
    match tier {
        UsageTier::Single => 1.0,
        UsageTier::Dual => 2.0,
        UsageTier::Heavy => 3.5,
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Render the graph as a left-to-right digraph
pub fn generate_dot(graph: &Graph, title: &str) -> String {
    let mut dot = String::new();
    dot.push_str("digraph NetworkTopology {\n");
    dot.push_str("    rankdir=LR;\n");
    dot.push_str("    node [shape=box, style=filled];\n");
    dot.push_str(&format!("    label=\"{}\";\n", escape(title)));
    dot.push_str("    labelloc=t;\n\n");

    for node in &graph.nodes {
        let rtt = node
            .avg_rtt_ms()
            .map(|v| format!("\\n{:.1} ms", v))
            .unwrap_or_default();
        let label = if node.label() == node.id {
            escape(&node.id)
        } else {
            format!("{}\\n{}", escape(node.label()), escape(&node.id))
        };
        dot.push_str(&format!(
            "    \"{}\" [label=\"{}\\n[{}]{}\", fillcolor={}];\n",
            escape(&node.id),
            label,
            node.role,
            rtt,
            role_color(node.role)
        ));
    }

    dot.push('\n');

    for edge in &graph.edges {
        let rtt = edge
            .avg_rtt_ms()
            .map(|v| format!(" {:.1} ms", v))
            .unwrap_or_default();
        dot.push_str(&format!(
            "    \"{}\" -> \"{}\" [label=\"x{}{}\", penwidth={}];\n",
            escape(&edge.from),
            escape(&edge.to),
            edge.usage_count,
            rtt,
            tier_penwidth(edge.usage_tier())
        ));
    }

    dot.push_str("}\n");
    dot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::types::{TopologyEdge, TopologyNode};

    #[test]
    fn test_dot_contains_nodes_and_weighted_edges() {
        let graph = Graph {
            nodes: vec![
                TopologyNode {
                    id: "client".to_string(),
                    hostname: None,
                    role: NodeRole::Client,
                    first_seen_run: "r".to_string(),
                    appearances: 1,
                    rtt_samples_ms: vec![],
                },
                TopologyNode {
                    id: "192.168.1.1".to_string(),
                    hostname: Some("gateway.lan".to_string()),
                    role: NodeRole::Gateway,
                    first_seen_run: "r".to_string(),
                    appearances: 3,
                    rtt_samples_ms: vec![1.0, 2.0],
                },
            ],
            edges: vec![TopologyEdge {
                from: "client".to_string(),
                to: "192.168.1.1".to_string(),
                usage_count: 3,
                rtt_samples_ms: vec![1.0, 2.0],
            }],
            traces_ingested: 3,
        };

        let dot = generate_dot(&graph, "Lab \"A\"");
        assert!(dot.starts_with("digraph NetworkTopology {"));
        assert!(dot.contains("label=\"Lab \\\"A\\\"\""));
        assert!(dot.contains("\"192.168.1.1\" [label=\"gateway.lan\\n192.168.1.1\\n[gateway]\\n1.5 ms\", fillcolor=gold];"));
        assert!(dot.contains("\"client\" -> \"192.168.1.1\" [label=\"x3 1.5 ms\", penwidth=3.5];"));
        assert!(dot.trim_end().ends_with('}'));
    }
}
