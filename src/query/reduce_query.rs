//! Reduce Fields Query
//!
//! A query handle combining a field-selecting clause with an optional remote
//! reducer (run once per queried node over its matching rows) and an optional
//! local reducer (run once per execution over the per-node results).
//!
//! ## Lifecycle
//! - **Configurable**: reducers, failure policy and timeout may be set.
//! - **Frozen**: entered on the first `reduce()` / `reduce_remote()` call and
//!   never left. Configuration setters fail with `ReduceError::Configuration`;
//!   `query_arguments` keeps working and later executions use the new values.
//!
//! Clones of a handle share the same state, so a setter racing an execution
//! on another clone is decided by whoever takes the state lock first.

use super::engine::{ExecutionPlan, QueryEngine};
use super::error::ReduceError;
use super::future::ReduceFuture;
use super::reducer::{CollectAll, CollectInto, Reducer, ReducerFactory};
use super::types::{Args, FailurePolicy, Projection, QueryPhase};
use crate::storage::Row;
use crate::storage::clause::SelectClause;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A remote reducer factory and the name other nodes know it by.
pub struct RemoteReducer<R1> {
    pub name: String,
    pub factory: Arc<dyn ReducerFactory<Row, R1>>,
}

impl<R1> Clone for RemoteReducer<R1> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: self.factory.clone(),
        }
    }
}

struct QueryState<R1, R2> {
    clause: String,
    args: Args,
    remote: Option<RemoteReducer<R1>>,
    local: Option<Arc<dyn ReducerFactory<R1, R2>>>,
    phase: QueryPhase,
    policy: FailurePolicy,
    timeout: Duration,
    executions: u64,
}

pub struct ReduceQuery<R1, R2> {
    engine: Arc<QueryEngine>,
    projection: Projection,
    state: Arc<Mutex<QueryState<R1, R2>>>,
}

impl<R1, R2> Clone for ReduceQuery<R1, R2> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            projection: self.projection.clone(),
            state: self.state.clone(),
        }
    }
}

impl<R1, R2> ReduceQuery<R1, R2> {
    pub(crate) fn new(engine: Arc<QueryEngine>, projection: Projection, clause: &str) -> Self {
        let config = engine.config();
        let state = QueryState {
            clause: clause.to_string(),
            args: Vec::new(),
            remote: None,
            local: None,
            phase: QueryPhase::Configurable,
            policy: config.failure_policy,
            timeout: config.dispatch_timeout,
            executions: 0,
        };

        Self {
            engine,
            projection,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueryState<R1, R2>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` only while the query is still configurable.
    fn configure<F>(&self, change: F) -> Result<Self, ReduceError>
    where
        F: FnOnce(&mut QueryState<R1, R2>),
    {
        let mut state = self.lock();
        if state.phase == QueryPhase::Frozen {
            tracing::warn!("Rejected configuration change on executed query '{}'", state.clause);
            return Err(ReduceError::already_executed());
        }
        change(&mut *state);
        drop(state);
        Ok(self.clone())
    }

    /// Sets the reducer run on every queried node. `name` must be registered
    /// in the `ReducerRegistry` of every remote target.
    pub fn remote_reducer<F>(&self, name: &str, factory: F) -> Result<Self, ReduceError>
    where
        F: ReducerFactory<Row, R1> + 'static,
    {
        self.remote_reducer_shared(name, Arc::new(factory))
    }

    pub fn remote_reducer_shared(
        &self,
        name: &str,
        factory: Arc<dyn ReducerFactory<Row, R1>>,
    ) -> Result<Self, ReduceError> {
        let remote = RemoteReducer {
            name: name.to_string(),
            factory,
        };
        self.configure(move |state| state.remote = Some(remote))
    }

    /// Sets the reducer that merges the per-node results on this node.
    pub fn local_reducer<F>(&self, factory: F) -> Result<Self, ReduceError>
    where
        F: ReducerFactory<R1, R2> + 'static,
    {
        let factory: Arc<dyn ReducerFactory<R1, R2>> = Arc::new(factory);
        self.configure(move |state| state.local = Some(factory))
    }

    pub fn failure_policy(&self, policy: FailurePolicy) -> Result<Self, ReduceError> {
        self.configure(move |state| state.policy = policy)
    }

    /// Upper bound for each remote target's answer.
    pub fn timeout(&self, timeout: Duration) -> Result<Self, ReduceError> {
        self.configure(move |state| state.timeout = timeout)
    }

    /// Rebinds the positional arguments. Allowed before and after execution.
    pub fn query_arguments<I>(&self, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.lock().args = args.into_iter().collect();
        self.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.lock().phase == QueryPhase::Frozen
    }

    pub fn clause(&self) -> String {
        self.lock().clause.clone()
    }

    pub fn arguments(&self) -> Args {
        self.lock().args.clone()
    }

    pub fn executions(&self) -> u64 {
        self.lock().executions
    }

    /// Freezes the query and copies out what this execution runs with.
    #[allow(clippy::type_complexity)]
    fn begin_execution(
        &self,
    ) -> Result<(ExecutionPlan<R1>, Option<Arc<dyn ReducerFactory<R1, R2>>>), ReduceError> {
        let (clause_text, args, remote, local, policy, timeout) = {
            let mut state = self.lock();
            if state.phase == QueryPhase::Configurable {
                tracing::debug!("Query '{}' frozen on first execution", state.clause);
                state.phase = QueryPhase::Frozen;
            }
            state.executions += 1;
            (
                state.clause.clone(),
                state.args.clone(),
                state.remote.clone(),
                state.local.clone(),
                state.policy,
                state.timeout,
            )
        };

        let clause =
            SelectClause::parse(&clause_text).map_err(|e| ReduceError::Clause(e.to_string()))?;
        clause
            .check_args(&args)
            .map_err(|e| ReduceError::Clause(e.to_string()))?;

        let plan = ExecutionPlan {
            query_id: uuid::Uuid::new_v4().to_string(),
            clause_text,
            clause,
            args,
            remote,
            policy,
            timeout,
        };
        Ok((plan, local))
    }
}

impl<R1, R2> ReduceQuery<R1, R2>
where
    R1: Serialize + DeserializeOwned + Clone + Send + 'static,
    R2: DeserializeOwned + Clone + Send + 'static,
{
    /// Runs the query and merges the per-node results with the local reducer.
    ///
    /// Without a local reducer the collection of per-node results is returned
    /// reinterpreted as `R2` (so `R2 = Vec<R1>` works).
    pub fn reduce(&self) -> ReduceFuture<R2> {
        let (plan, local) = match self.begin_execution() {
            Ok(prepared) => prepared,
            Err(e) => return ReduceFuture::ready(Err(e)),
        };

        let merger: Box<dyn Reducer<R1, R2>> = match local {
            Some(factory) => factory.create(&plan.args),
            None => Box::new(CollectInto::new()),
        };

        self.engine.execute(&self.projection, plan, merger)
    }

    /// Runs the query and returns every per-node result, in arrival order.
    pub fn reduce_remote(&self) -> ReduceFuture<Vec<R1>> {
        let (plan, _) = match self.begin_execution() {
            Ok(prepared) => prepared,
            Err(e) => return ReduceFuture::ready(Err(e)),
        };

        let merger: Box<dyn Reducer<R1, Vec<R1>>> = Box::new(CollectAll::new());
        self.engine.execute(&self.projection, plan, merger)
    }
}
