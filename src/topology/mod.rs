//! Network topology inference from path-discovery traces.
//!
//! - [`rules`]: ordered, data-driven node-role classification
//! - [`builder`]: cumulative graph of nodes and usage-weighted edges
//! - [`dot`]: GraphViz output

pub mod builder;
pub mod dot;
pub mod rules;
pub mod types;

pub use builder::{IngestOutcome, TopologyBuilder};
pub use dot::generate_dot;
pub use rules::{GatewayMatcher, NodeContext, Predicate, RoleRules, RuleError};
pub use types::{Graph, NodeRole, TopologyEdge, TopologyNode, UsageTier};
