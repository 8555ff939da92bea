use super::error::TargetFailure;
use crate::membership::types::NodeId;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Positional query arguments. `Value::Null` is a valid argument.
pub type Args = Vec<serde_json::Value>;

/// What to do when a single target fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Any failed target fails the whole execution.
    #[default]
    FailFast,
    /// Failed targets contribute nothing; the result reflects the survivors.
    TolerateFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryPhase {
    Configurable,
    Frozen,
}

/// Which nodes a query runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Local,
    Nodes(Vec<NodeId>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for one target's answer, including retries.
    pub dispatch_timeout: Duration,
    /// Attempts per internode request.
    pub retry_attempts: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

/// What one target contributed to an execution.
#[derive(Debug)]
pub struct NodeResult<R1> {
    pub node_id: NodeId,
    pub outcome: Result<Vec<R1>, TargetFailure>,
}

/// Cooperative cancellation signal shared by a future and the loops feeding it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
