//! Cumulative topology construction from path-discovery traces.

use std::collections::{HashMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::rules::{NodeContext, RoleRules};
use super::types::{Graph, TopologyEdge, TopologyNode};
use crate::artifacts::Trace;

/// What one `ingest` call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub resolved_hops: usize,
    /// Timeout / unresolvable hops left out of the path
    pub skipped_hops: usize,
    pub edges_touched: usize,
    pub new_nodes: usize,
}

/// One position of the normalized path
struct PathPoint<'t> {
    id: &'t str,
    hostname: Option<&'t str>,
    rtts: &'t [f64],
}

/// Accumulates nodes and edges across every ingested trace.
///
/// Updates are additive only: nodes keep the role they were first given,
/// edges only ever gain usage and samples.
pub struct TopologyBuilder {
    rules: RoleRules,
    client_id: String,
    nodes: Vec<TopologyNode>,
    node_index: HashMap<String, usize>,
    edges: Vec<TopologyEdge>,
    edge_index: HashMap<(String, String), usize>,
    traces_ingested: usize,
}

impl TopologyBuilder {
    pub fn new(rules: RoleRules, client_id: impl Into<String>) -> Self {
        Self {
            rules,
            client_id: client_id.into(),
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            traces_ingested: 0,
        }
    }

    pub fn traces_ingested(&self) -> usize {
        self.traces_ingested
    }

    /// Use a gateway read from the route table for nodes classified from now on.
    /// Ignored when a gateway is already configured or detected, or when
    /// `address` is not an IP.
    pub fn detect_gateway(&mut self, address: &str) {
        let Ok(ip) = address.parse() else {
            debug!("Ignoring non-IP gateway {}", address);
            return;
        };
        if self.rules.detect_gateway(ip) {
            debug!("Using detected default gateway {}", address);
        }
    }

    /// Make more servers and endpoints known to the role rules
    pub fn learn_identities(&mut self, servers: &[String], endpoints: &[String]) {
        self.rules.learn_identities(servers, endpoints);
    }

    /// Fold one trace into the graph. `run_id` labels nodes seen for the first time.
    pub fn ingest(&mut self, trace: &Trace, run_id: &str) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        let source = trace.source.as_deref().unwrap_or(&self.client_id).to_string();
        let destination = trace.destination();

        let mut path: Vec<PathPoint> = vec![PathPoint {
            id: source.as_str(),
            hostname: None,
            rtts: &[],
        }];

        for hop in &trace.hops {
            let Some(id) = hop.identity() else {
                outcome.skipped_hops += 1;
                continue;
            };
            outcome.resolved_hops += 1;
            // Repeated responders (e.g. a router answering for two TTLs) collapse
            if path.last().is_some_and(|p| p.id == id) {
                continue;
            }
            path.push(PathPoint {
                id,
                hostname: hop.hostname.as_deref().filter(|h| *h != id),
                rtts: &hop.rtts_ms,
            });
        }

        let reached_hops = path.len() > 1;

        if let Some(dest) = destination {
            if path.last().map_or(true, |p| p.id != dest) {
                path.push(PathPoint {
                    id: dest,
                    hostname: trace.target.as_deref().filter(|t| *t != dest),
                    rtts: &[],
                });
            }
        }

        let mut seen_this_trace: HashSet<&str> = HashSet::new();
        for point in &path {
            let is_source = point.id == source;
            let is_destination = destination == Some(point.id);
            if self.upsert_node(point, run_id, is_source, is_destination) {
                outcome.new_nodes += 1;
            }
            let idx = self.node_index[point.id];
            let node = &mut self.nodes[idx];
            if seen_this_trace.insert(point.id) {
                node.appearances += 1;
            }
            node.rtt_samples_ms.extend_from_slice(point.rtts);
        }

        // Without a single resolved hop there is no observed adjacency
        if reached_hops {
            for pair in path.windows(2) {
                self.upsert_edge(pair[0].id, pair[1].id, pair[1].rtts);
                outcome.edges_touched += 1;
            }
        }

        self.traces_ingested += 1;
        debug!(
            "Ingested trace to {:?} from run {}: {} resolved, {} skipped, {} edges",
            destination, run_id, outcome.resolved_hops, outcome.skipped_hops, outcome.edges_touched
        );

        outcome
    }

    /// Returns true when the node was created
    fn upsert_node(
        &mut self,
        point: &PathPoint,
        run_id: &str,
        is_source: bool,
        is_destination: bool,
    ) -> bool {
        if let Some(&idx) = self.node_index.get(point.id) {
            let node = &mut self.nodes[idx];
            if node.hostname.is_none() {
                node.hostname = point.hostname.map(str::to_string);
            }
            return false;
        }

        let mut ctx = NodeContext::new(point.id, point.hostname);
        ctx.is_source = is_source;
        ctx.is_destination = is_destination;
        let role = self.rules.classify(&ctx);

        debug!("New node {} ({:?}) classified as {}", point.id, point.hostname, role);

        self.node_index.insert(point.id.to_string(), self.nodes.len());
        self.nodes.push(TopologyNode {
            id: point.id.to_string(),
            hostname: point.hostname.map(str::to_string),
            role,
            first_seen_run: run_id.to_string(),
            appearances: 0,
            rtt_samples_ms: Vec::new(),
        });
        true
    }

    fn upsert_edge(&mut self, from: &str, to: &str, rtts: &[f64]) {
        let key = (from.to_string(), to.to_string());
        let idx = match self.edge_index.get(&key) {
            Some(&idx) => idx,
            None => {
                self.edges.push(TopologyEdge {
                    from: key.0.clone(),
                    to: key.1.clone(),
                    usage_count: 0,
                    rtt_samples_ms: Vec::new(),
                });
                self.edge_index.insert(key, self.edges.len() - 1);
                self.edges.len() - 1
            }
        };
        let edge = &mut self.edges[idx];
        edge.usage_count += 1;
        edge.rtt_samples_ms.extend_from_slice(rtts);
    }

    /// Snapshot of the graph so far
    pub fn build(&self) -> Graph {
        Graph {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            traces_ingested: self.traces_ingested,
        }
    }
}
