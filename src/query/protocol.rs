//! Query Network Protocol
//!
//! DTOs exchanged between the coordinating node and the queried nodes, plus
//! the public endpoint used to run a reduce over the whole cluster.

use super::types::Args;
use crate::membership::types::NodeId;
use serde::{Deserialize, Serialize};

/// Internal endpoint that runs a field scan and remote reduction on the receiving node.
pub const ENDPOINT_INTERNAL_REDUCE: &str = "/internal/reduce_fields";
/// Public endpoint that runs `reduce_remote` with a registered reducer over all alive nodes.
pub const ENDPOINT_REDUCE_REMOTE: &str = "/query/reduce_remote";

/// One target's share of an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceRequest {
    /// Execution id, for log correlation only.
    pub query_id: String,
    pub clause: String,
    pub args: Args,
    /// Registered remote reducer name. `None` returns every matching row.
    pub reducer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReduceResponse {
    pub node_id: NodeId,
    /// The reduced value, or every matching row when no reducer was named.
    pub values: Vec<serde_json::Value>,
    /// Set when the scan or the reducer failed on the node.
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicReduceRequest {
    pub clause: String,
    #[serde(default)]
    pub args: Args,
    pub reducer: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublicReduceResponse {
    pub values: Vec<serde_json::Value>,
    pub error: Option<String>,
}
