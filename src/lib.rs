//! Distributed Reduce Query Cluster Library
//!
//! This library crate defines the core modules of a cache node that answers
//! field queries with a two-level map-reduce. It serves as the foundation for
//! the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of three loosely coupled subsystems:
//!
//! - **`membership`**: The cluster view. Tracks the local node and its peers with their
//!   liveness, and decides which nodes a projection resolves to.
//! - **`storage`**: The local data layer. Holds rows in hash partitions (`RowStore`) and
//!   scans them for a parsed `select` clause (`FieldScan`).
//! - **`query`**: The distributed reduce engine. Builds `ReduceQuery` handles, fans scans
//!   out to target nodes, runs remote reducers next to the data and merges the partial
//!   results locally into a `ReduceFuture`.

pub mod membership;
pub mod query;
pub mod storage;
