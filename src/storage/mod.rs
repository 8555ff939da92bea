//! Row Storage Module
//!
//! The data side the query engine scans. Rows are JSON objects grouped by
//! table, hashed into fixed partitions and kept in memory on the node that
//! received them.
//!
//! ## Core Concepts
//! - **Partitioning**: `PartitionManager` maps a row key to one of a fixed set of partitions.
//! - **Clause**: `SelectClause` is the field-extraction plan for a `select ... where ...` string.
//! - **Field scan**: `FieldScan` yields the selected field values of every matching row,
//!   lazily, one partition at a time.

pub mod clause;
pub mod handlers;
pub mod memory;
pub mod partitioner;
pub mod protocol;

use anyhow::Result;
use serde_json::Value;

use clause::SelectClause;

/// The selected field values of one matching row, in select order.
pub type Row = Vec<Value>;

pub type RowIter<'a> = Box<dyn Iterator<Item = Row> + Send + 'a>;

/// Node-local source of field rows for a clause.
///
/// The returned iterator is finite and single-use; every call starts a new scan.
pub trait FieldScan: Send + Sync {
    fn scan<'a>(&'a self, clause: &SelectClause, args: &[Value]) -> Result<RowIter<'a>>;
}
