use crate::membership::types::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetErrorKind {
    /// The scan or the remote reducer failed on the target.
    Execution,
    /// The target could not be reached or did not answer in time.
    Transport,
}

/// Why a single target contributed no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetFailure {
    pub node_id: NodeId,
    pub kind: TargetErrorKind,
    pub message: String,
}

impl TargetFailure {
    pub fn execution(node_id: NodeId, message: impl Into<String>) -> Self {
        Self {
            node_id,
            kind: TargetErrorKind::Execution,
            message: message.into(),
        }
    }

    pub fn transport(node_id: NodeId, message: impl Into<String>) -> Self {
        Self {
            node_id,
            kind: TargetErrorKind::Transport,
            message: message.into(),
        }
    }
}

impl fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.node_id, self.kind, self.message)
    }
}

/// Errors observable through a query or its future.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReduceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{} target(s) failed: {}", .0.len(), describe(.0))]
    Targets(Vec<TargetFailure>),

    #[error("local reduction failed: {0}")]
    LocalReduction(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("result conversion failed: {0}")]
    Conversion(String),

    #[error("invalid clause: {0}")]
    Clause(String),

    #[error("no async runtime available to dispatch to {0} target(s)")]
    NoRuntime(usize),
}

impl ReduceError {
    pub fn already_executed() -> Self {
        Self::Configuration("query already executed; clause/reducers cannot change".to_string())
    }

    /// Nodes named by a `Targets` error, empty otherwise.
    pub fn failed_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::Targets(failures) => failures.iter().map(|f| f.node_id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Local reducer errors keep their kind when a reducer returns a
    /// `ReduceError` through `anyhow`.
    pub(crate) fn from_local(err: anyhow::Error) -> Self {
        match err.downcast::<ReduceError>() {
            Ok(reduce_err) => reduce_err,
            Err(other) => Self::LocalReduction(format!("{:#}", other)),
        }
    }
}

fn describe(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
