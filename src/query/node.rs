//! Node-local Execution
//!
//! Drives a field scan through a reducer on the node that holds the rows.
//! Used in-process by the coordinator for its own node and by the internal
//! HTTP handler for scans requested by other nodes.

use super::protocol::ReduceRequest;
use super::reducer::Reducer;
use super::registry::ReducerRegistry;
use super::types::CancelFlag;
use crate::membership::types::NodeId;
use crate::storage::clause::SelectClause;
use crate::storage::{FieldScan, Row, RowIter};

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// Folds `rows` into `reducer` until the rows run out, the reducer saturates
/// or the execution is cancelled, then finishes it.
pub fn reduce_rows<R>(
    rows: RowIter<'_>,
    mut reducer: Box<dyn Reducer<Row, R>>,
    cancel: &CancelFlag,
) -> Result<R> {
    let mut collected = 0usize;
    for row in rows {
        if cancel.is_cancelled() {
            tracing::debug!("Scan cancelled after {} row(s)", collected);
            break;
        }
        collected += 1;
        if !reducer.collect(row)? {
            tracing::debug!("Remote reducer saturated after {} row(s)", collected);
            break;
        }
    }
    reducer.finish()
}

/// Scan requested by another node, validated and ready to run.
pub struct PreparedScan {
    clause: SelectClause,
    args: Vec<Value>,
    reducer: Option<Box<dyn Reducer<Row, Value>>>,
}

/// Serves internode scan requests against this node's rows.
pub struct QueryNode {
    node_id: NodeId,
    scan: Arc<dyn FieldScan>,
    registry: Arc<ReducerRegistry>,
}

impl QueryNode {
    pub fn new(node_id: NodeId, scan: Arc<dyn FieldScan>, registry: Arc<ReducerRegistry>) -> Self {
        Self {
            node_id,
            scan,
            registry,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Parses the clause and resolves the named reducer.
    pub fn prepare(&self, request: &ReduceRequest) -> Result<PreparedScan> {
        let clause = SelectClause::parse(&request.clause)?;
        clause.check_args(&request.args)?;

        let reducer = match &request.reducer {
            Some(name) => Some(self.registry.create(name, &request.args)?),
            None => None,
        };

        Ok(PreparedScan {
            clause,
            args: request.args.clone(),
            reducer,
        })
    }

    /// Runs a prepared scan. Returns one value when a reducer was named,
    /// otherwise every matching row as a JSON array.
    pub fn run(&self, prepared: PreparedScan) -> Result<Vec<Value>> {
        let rows = self.scan.scan(&prepared.clause, &prepared.args)?;

        match prepared.reducer {
            Some(reducer) => {
                let value = reduce_rows(rows, reducer, &CancelFlag::default())?;
                Ok(vec![value])
            }
            None => Ok(rows.map(Value::Array).collect()),
        }
    }

    pub fn execute(&self, request: &ReduceRequest) -> Result<Vec<Value>> {
        let prepared = self.prepare(request)?;
        self.run(prepared)
    }
}
