use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;

use super::types::{Node, NodeId, NodeState};

/// Static view of the cluster as seen from one node.
pub struct ClusterView {
    pub local_node: Node,
    pub members: Arc<DashMap<NodeId, Node>>,
}

impl ClusterView {
    pub fn new(local_node: Node) -> Arc<Self> {
        let members = Arc::new(DashMap::new());
        members.insert(local_node.id.clone(), local_node.clone());

        tracing::info!("Cluster view created for local node {}", local_node.id);

        Arc::new(Self {
            local_node,
            members,
        })
    }

    /// Adds (or replaces) a peer. The local node cannot be replaced.
    pub fn add_member(&self, node: Node) -> Result<()> {
        if node.id == self.local_node.id {
            return Err(anyhow::anyhow!(
                "Node {} is the local node and cannot be re-registered",
                node.id
            ));
        }

        tracing::info!("Registered member {} at {}", node.id, node.http_addr);
        self.members.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn set_state(&self, node_id: &NodeId, state: NodeState) -> Result<()> {
        let mut member = self
            .members
            .get_mut(node_id)
            .ok_or_else(|| anyhow::anyhow!("Unknown member: {}", node_id))?;

        if member.state != state {
            tracing::info!("Member {} is now {:?}", node_id, state);
            member.state = state;
        }
        Ok(())
    }

    pub fn get_member(&self, node_id: &NodeId) -> Option<Node> {
        self.members.get(node_id).map(|entry| entry.value().clone())
    }

    /// Alive members sorted by id so target resolution is deterministic.
    pub fn get_alive_members(&self) -> Vec<Node> {
        let mut alive: Vec<Node> = self
            .members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect();
        alive.sort_by(|a, b| a.id.cmp(&b.id));
        alive
    }

    pub fn is_local(&self, node_id: &NodeId) -> bool {
        &self.local_node.id == node_id
    }
}
