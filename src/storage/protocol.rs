//! Storage Network Protocol
//!
//! DTOs for loading rows into a node over HTTP.

use serde::{Deserialize, Serialize};

/// Public endpoint for storing one row on the receiving node.
pub const ENDPOINT_PUT_ROW: &str = "/rows";

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRowRequest {
    pub table: String,
    pub key: String,
    /// Must be a JSON object.
    pub row: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutRowResponse {
    pub success: bool,
    pub partition: Option<u32>,
}
