//! Distributed Reduce Query Module
//!
//! Executes field queries as a two-level map-reduce across the cluster.
//!
//! ## Protocol Overview
//! 1. **Configuration**: a `ReduceQuery` is created from a `CacheProjection` and given an
//!    optional remote reducer, an optional local reducer and its arguments.
//! 2. **Freeze**: the first execution freezes the query; only arguments can change afterwards.
//! 3. **Remote reduction**: every target node scans its rows for the clause and folds the
//!    selected fields through a fresh remote reducer into one partial value.
//! 4. **Local reduction**: the calling node folds the partial values, in arrival order,
//!    through one fresh local reducer and completes the `ReduceFuture`.
//!
//! ## Submodules
//! - **`reducer`**: the `Reducer` / `ReducerFactory` contracts.
//! - **`registry`**: named remote reducers, so a node can rebuild the reducer a query names.
//! - **`reduce_query`**: the query handle and its configurable/frozen state machine.
//! - **`engine`**: target resolution, dispatch, collection and merge.
//! - **`node`**: node-local scan execution shared by both execution paths.
//! - **`future`**: the single-assignment result handle.
//! - **`transport`** / **`protocol`** / **`handlers`**: the HTTP internode path.
//! - **`stock`**: ready-made reducers.

pub mod engine;
pub mod error;
pub mod future;
pub mod handlers;
pub mod node;
pub mod protocol;
pub mod reduce_query;
pub mod reducer;
pub mod registry;
pub mod stock;
pub mod transport;
pub mod types;
