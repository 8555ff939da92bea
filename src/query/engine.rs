//! Execution Coordinator
//!
//! Resolves the targets of a projection, runs one remote reduction per target
//! and folds the per-target results through the execution's local reducer.
//!
//! ## Execution Paths
//! 1. **Single node**: the projection resolves to exactly the local node. The
//!    scan, the remote reducer and the local reducer run on the calling thread
//!    and the returned future is already complete.
//! 2. **Distributed**: every target runs in its own task. Results arrive over
//!    a channel in completion order and are folded by one collector task.
//!    The local node's scan runs on the blocking pool. Saturation of the local
//!    reducer, a local reducer error or cancellation aborts the targets still
//!    running and raises the execution's cancel flag so local scans stop too.
//!
//! Reducer code is user code: a panic in a remote reducer fails that target,
//! a panic in the local reducer fails the execution.

use super::error::{ReduceError, TargetFailure};
use super::future::{ReduceFuture, ReduceResult};
use super::node::reduce_rows;
use super::protocol::ReduceRequest;
use super::reduce_query::{ReduceQuery, RemoteReducer};
use super::reducer::Reducer;
use super::transport::Transport;
use super::types::{Args, CancelFlag, EngineConfig, FailurePolicy, NodeResult, Projection};
use crate::membership::service::ClusterView;
use crate::membership::types::{Node, NodeId};
use crate::storage::FieldScan;
use crate::storage::clause::SelectClause;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};

/// Everything a target needs, snapshotted when the execution starts.
pub(crate) struct ExecutionPlan<R1> {
    pub query_id: String,
    pub clause_text: String,
    pub clause: SelectClause,
    pub args: Args,
    pub remote: Option<RemoteReducer<R1>>,
    pub policy: FailurePolicy,
    pub timeout: Duration,
}

pub struct QueryEngine {
    cluster: Arc<ClusterView>,
    scan: Arc<dyn FieldScan>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        cluster: Arc<ClusterView>,
        scan: Arc<dyn FieldScan>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            cluster,
            scan,
            transport,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn local_node_id(&self) -> NodeId {
        self.cluster.local_node.id.clone()
    }

    pub fn projection(self: &Arc<Self>, projection: Projection) -> CacheProjection {
        CacheProjection {
            engine: self.clone(),
            projection,
        }
    }

    pub fn for_all(self: &Arc<Self>) -> CacheProjection {
        self.projection(Projection::All)
    }

    pub fn for_local(self: &Arc<Self>) -> CacheProjection {
        self.projection(Projection::Local)
    }

    pub fn for_nodes(self: &Arc<Self>, nodes: Vec<NodeId>) -> CacheProjection {
        self.projection(Projection::Nodes(nodes))
    }

    /// Alive members selected by `projection`, sorted by node id.
    pub fn resolve_targets(&self, projection: &Projection) -> Vec<Node> {
        let alive = self.cluster.get_alive_members();

        match projection {
            Projection::All => alive,
            Projection::Local => alive
                .into_iter()
                .filter(|node| self.cluster.is_local(&node.id))
                .collect(),
            Projection::Nodes(ids) => {
                let targets: Vec<Node> = alive
                    .into_iter()
                    .filter(|node| ids.contains(&node.id))
                    .collect();
                if targets.len() < ids.len() {
                    tracing::warn!(
                        "Projection names {} node(s) but only {} are alive",
                        ids.len(),
                        targets.len()
                    );
                }
                targets
            }
        }
    }

    pub(crate) fn execute<R1, Out>(
        self: &Arc<Self>,
        projection: &Projection,
        plan: ExecutionPlan<R1>,
        merger: Box<dyn Reducer<R1, Out>>,
    ) -> ReduceFuture<Out>
    where
        R1: DeserializeOwned + Send + 'static,
        Out: Clone + Send + 'static,
    {
        let future = ReduceFuture::pending();
        let targets = self.resolve_targets(projection);

        tracing::info!(
            "Executing reduce query {} ({}) on {} target(s)",
            plan.query_id,
            plan.clause_text,
            targets.len()
        );

        if targets.is_empty() {
            tracing::warn!("Query {} resolved no targets", plan.query_id);
            future.settle(finish_merge(merger));
            return future;
        }

        if targets.len() == 1 && self.cluster.is_local(&targets[0].id) {
            let cancel = future.cancel_flag();
            let scanned = catch_panic(|| self.scan_local(&plan, &cancel))
                .unwrap_or_else(|message| Err(panicked(self.local_node_id(), &message)));
            let result = match scanned {
                Ok(values) => merge_all(merger, values),
                Err(failure) => match plan.policy {
                    FailurePolicy::FailFast => Err(ReduceError::Targets(vec![failure])),
                    FailurePolicy::TolerateFailures => {
                        tracing::warn!("Ignoring failed target {}", failure);
                        finish_merge(merger)
                    }
                },
            };
            log_outcome(&plan.query_id, &result);
            future.settle(result);
            return future;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::error!("Query {} has no runtime to dispatch on", plan.query_id);
                future.fail(ReduceError::NoRuntime(targets.len()));
                return future;
            }
        };

        let engine = self.clone();
        let query_id = plan.query_id.clone();
        let collector_future = future.clone();
        let collector = handle.spawn(async move {
            engine
                .collect(targets, Arc::new(plan), merger, collector_future)
                .await;
        });

        // Anything that kills the collector still has to settle the future.
        let supervised = future.clone();
        handle.spawn(async move {
            if let Err(err) = collector.await {
                let error = if err.is_panic() {
                    ReduceError::LocalReduction(format!(
                        "collector panicked: {}",
                        panic_message(err.into_panic())
                    ))
                } else {
                    ReduceError::LocalReduction("collector stopped".to_string())
                };
                if supervised.fail(error) {
                    tracing::error!("Query {} lost its collector", query_id);
                }
            }
        });

        future
    }

    /// Fans out to every target and folds the results as they arrive.
    async fn collect<R1, Out>(
        self: Arc<Self>,
        targets: Vec<Node>,
        plan: Arc<ExecutionPlan<R1>>,
        mut merger: Box<dyn Reducer<R1, Out>>,
        future: ReduceFuture<Out>,
    ) where
        R1: DeserializeOwned + Send + 'static,
        Out: Clone + Send + 'static,
    {
        let cancel = future.cancel_flag();
        let (tx, mut rx) = mpsc::unbounded_channel::<NodeResult<R1>>();
        let mut tasks = JoinSet::new();
        let mut pending: HashSet<NodeId> = HashSet::new();

        for node in targets {
            pending.insert(node.id.clone());
            let engine = self.clone();
            let plan = plan.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let node_id = node.id.clone();
                let outcome = engine.run_target(node, plan, cancel).await;
                // The collector may already have stopped listening.
                let _ = tx.send(NodeResult { node_id, outcome });
            });
        }
        drop(tx);

        let mut failures: Vec<TargetFailure> = Vec::new();
        let mut reported = 0usize;
        let mut saturated = false;

        loop {
            let result = tokio::select! {
                received = rx.recv() => match received {
                    Some(result) => result,
                    None => break,
                },
                // Only cancellation completes the future while we are collecting.
                _ = future.get() => {
                    tracing::info!("Query {} cancelled, discarding late results", plan.query_id);
                    stop_targets(&mut tasks, &cancel);
                    return;
                }
            };
            reported += 1;
            pending.remove(&result.node_id);

            let values = match result.outcome {
                Ok(values) => values,
                Err(failure) => {
                    record_failure(plan.policy, &plan.query_id, failure, &mut failures);
                    continue;
                }
            };

            tracing::debug!(
                "Query {}: {} value(s) from {}",
                plan.query_id,
                values.len(),
                result.node_id
            );

            if !failures.is_empty() {
                continue;
            }

            match catch_panic(|| fold_values(merger.as_mut(), values)) {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => {
                    tracing::debug!(
                        "Local reducer saturated after {} target(s) in query {}",
                        reported,
                        plan.query_id
                    );
                    stop_targets(&mut tasks, &cancel);
                    saturated = true;
                    break;
                }
                Ok(Err(e)) => {
                    stop_targets(&mut tasks, &cancel);
                    let error = ReduceError::from_local(e);
                    tracing::error!("Query {} failed: {}", plan.query_id, error);
                    future.fail(error);
                    return;
                }
                Err(message) => {
                    stop_targets(&mut tasks, &cancel);
                    tracing::error!(
                        "Local reducer panicked in query {}: {}",
                        plan.query_id,
                        message
                    );
                    future.fail(local_panic(message));
                    return;
                }
            }
        }

        // Every target task reports, so a silent target means its task died.
        if !saturated {
            let mut silent: Vec<NodeId> = pending.into_iter().collect();
            silent.sort();
            for node_id in silent {
                let failure =
                    TargetFailure::execution(node_id, "target stopped without reporting a result");
                record_failure(plan.policy, &plan.query_id, failure, &mut failures);
            }
        }

        let result = if failures.is_empty() {
            finish_merge(merger)
        } else {
            Err(ReduceError::Targets(failures))
        };

        log_outcome(&plan.query_id, &result);
        future.settle(result);
    }

    /// Runs one target in its own task so a panic there becomes a failure of
    /// that target. The local scan runs on the blocking pool.
    async fn run_target<R1>(
        self: Arc<Self>,
        node: Node,
        plan: Arc<ExecutionPlan<R1>>,
        cancel: CancelFlag,
    ) -> Result<Vec<R1>, TargetFailure>
    where
        R1: DeserializeOwned + Send + 'static,
    {
        let node_id = node.id.clone();

        let joined = if self.cluster.is_local(&node.id) {
            tokio::task::spawn_blocking(move || self.scan_local(&plan, &cancel)).await
        } else {
            let work = tokio::spawn(async move { self.dispatch_remote(&node, &plan).await });
            let _abort = AbortOnDrop(work.abort_handle());
            work.await
        };

        joined.unwrap_or_else(|err| {
            if err.is_panic() {
                Err(panicked(node_id, &panic_message(err.into_panic())))
            } else {
                Err(TargetFailure::execution(node_id, "target task was cancelled"))
            }
        })
    }

    /// Runs the scan and the typed remote reducer in-process.
    fn scan_local<R1>(
        &self,
        plan: &ExecutionPlan<R1>,
        cancel: &CancelFlag,
    ) -> Result<Vec<R1>, TargetFailure>
    where
        R1: DeserializeOwned,
    {
        let node_id = self.local_node_id();
        let failed =
            |e: anyhow::Error| TargetFailure::execution(node_id.clone(), format!("{:#}", e));

        let rows = self.scan.scan(&plan.clause, &plan.args).map_err(failed)?;

        match &plan.remote {
            Some(remote) => {
                let reducer = remote.factory.create(&plan.args);
                let value = reduce_rows(rows, reducer, cancel).map_err(failed)?;
                Ok(vec![value])
            }
            None => rows
                .take_while(|_| !cancel.is_cancelled())
                .map(|row| serde_json::from_value(Value::Array(row)))
                .collect::<Result<Vec<R1>, _>>()
                .map_err(|e| failed(e.into())),
        }
    }

    async fn dispatch_remote<R1>(
        &self,
        node: &Node,
        plan: &ExecutionPlan<R1>,
    ) -> Result<Vec<R1>, TargetFailure>
    where
        R1: DeserializeOwned,
    {
        let request = ReduceRequest {
            query_id: plan.query_id.clone(),
            clause: plan.clause_text.clone(),
            args: plan.args.clone(),
            reducer: plan.remote.as_ref().map(|remote| remote.name.clone()),
        };

        tracing::debug!("Dispatching query {} to {}", plan.query_id, node.id);

        let response =
            match tokio::time::timeout(plan.timeout, self.transport.dispatch(node, request)).await
            {
                Err(_) => {
                    return Err(TargetFailure::transport(
                        node.id.clone(),
                        format!("no answer within {:?}", plan.timeout),
                    ));
                }
                Ok(Err(e)) => {
                    return Err(TargetFailure::transport(node.id.clone(), format!("{:#}", e)));
                }
                Ok(Ok(response)) => response,
            };

        if let Some(error) = response.error {
            return Err(TargetFailure::execution(node.id.clone(), error));
        }

        response
            .values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<R1>, _>>()
            .map_err(|e| {
                TargetFailure::execution(node.id.clone(), format!("unexpected result type: {}", e))
            })
    }
}

/// Aborts the target tasks and tells the scans still running to stop.
fn stop_targets(tasks: &mut JoinSet<()>, cancel: &CancelFlag) {
    cancel.cancel();
    tasks.abort_all();
}

fn record_failure(
    policy: FailurePolicy,
    query_id: &str,
    failure: TargetFailure,
    failures: &mut Vec<TargetFailure>,
) {
    match policy {
        FailurePolicy::FailFast => {
            tracing::warn!("Target failed in query {}: {}", query_id, failure);
            failures.push(failure);
        }
        FailurePolicy::TolerateFailures => {
            tracing::warn!("Ignoring failed target {}", failure);
        }
    }
}

/// Feeds `values` to the local reducer. `Ok(false)` once it saturates.
fn fold_values<R1, Out>(
    merger: &mut dyn Reducer<R1, Out>,
    values: Vec<R1>,
) -> anyhow::Result<bool> {
    for value in values {
        if !merger.collect(value)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn finish_merge<R1, Out>(merger: Box<dyn Reducer<R1, Out>>) -> ReduceResult<Out> {
    catch_panic(|| merger.finish())
        .map_err(local_panic)?
        .map_err(ReduceError::from_local)
}

fn merge_all<R1, Out>(
    mut merger: Box<dyn Reducer<R1, Out>>,
    values: Vec<R1>,
) -> ReduceResult<Out> {
    catch_panic(|| fold_values(merger.as_mut(), values))
        .map_err(local_panic)?
        .map_err(ReduceError::from_local)?;
    finish_merge(merger)
}

fn local_panic(message: String) -> ReduceError {
    ReduceError::LocalReduction(format!("local reducer panicked: {}", message))
}

/// Runs user reducer code, turning a panic into its message.
fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(panic_message)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn panicked(node_id: NodeId, message: &str) -> TargetFailure {
    TargetFailure::execution(node_id, format!("target panicked: {}", message))
}

/// Aborts a spawned target when the task waiting on it is aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn log_outcome<T>(query_id: &str, result: &ReduceResult<T>) {
    match result {
        Ok(_) => tracing::info!("Query {} completed", query_id),
        Err(e) => tracing::error!("Query {} failed: {}", query_id, e),
    }
}

/// A view of the cache restricted to a set of nodes; queries created from it
/// run on that set.
#[derive(Clone)]
pub struct CacheProjection {
    engine: Arc<QueryEngine>,
    projection: Projection,
}

impl CacheProjection {
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn create_reduce_fields_query<R1, R2>(&self, clause: &str) -> ReduceQuery<R1, R2> {
        ReduceQuery::new(self.engine.clone(), self.projection.clone(), clause)
    }
}
