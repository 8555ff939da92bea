//! Cluster Membership Module
//!
//! Holds the node table the query engine resolves its targets against.
//! Discovery and failure detection live outside this crate: members are
//! registered up front (or by the embedding service) and their liveness is
//! updated through `ClusterView::set_state`.
//!
//! ## Core Concepts
//! - **Local node**: the node queries are issued from. A projection that
//!   resolves to exactly this node runs without any network dispatch.
//! - **Alive members**: only nodes in the `Alive` state are query targets.

pub mod service;
pub mod types;

#[cfg(test)]
mod tests;
