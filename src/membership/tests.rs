//! Membership Module Tests
//!
//! ## Test Scopes
//! - **Data Structures**: node id uniqueness, equality and ordering.
//! - **Cluster View**: member registration, liveness changes and target ordering.

#[cfg(test)]
mod tests {
    use crate::membership::service::ClusterView;
    use crate::membership::types::{Node, NodeId, NodeState};
    use std::collections::HashSet;

    fn node(id: &str, port: u16) -> Node {
        Node::alive(
            NodeId::from(id),
            format!("127.0.0.1:{}", port).parse().unwrap(),
        )
    }

    // ============================================================
    // NODE ID TESTS
    // ============================================================

    #[test]
    fn test_node_id_is_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        assert_ne!(id1, id2, "Each NodeId should be unique");
    }

    #[test]
    fn test_node_id_hash_and_display() {
        let mut set = HashSet::new();
        set.insert(NodeId::from("node-1"));
        set.insert(NodeId::from("node-1"));
        set.insert(NodeId::from("node-2"));

        assert_eq!(set.len(), 2);
        assert_eq!(NodeId::from("node-7").to_string(), "node-7");
    }

    // ============================================================
    // CLUSTER VIEW TESTS
    // ============================================================

    #[test]
    fn test_cluster_view_contains_local_node() {
        let view = ClusterView::new(node("local", 6000));

        let alive = view.get_alive_members();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].id, NodeId::from("local"));
        assert!(view.is_local(&NodeId::from("local")));
    }

    #[test]
    fn test_alive_members_are_sorted_by_id() {
        let view = ClusterView::new(node("b", 6000));
        view.add_member(node("c", 6001)).unwrap();
        view.add_member(node("a", 6002)).unwrap();

        let ids: Vec<String> = view
            .get_alive_members()
            .into_iter()
            .map(|n| n.id.0)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dead_members_are_not_targets() {
        let view = ClusterView::new(node("a", 6000));
        view.add_member(node("b", 6001)).unwrap();

        view.set_state(&NodeId::from("b"), NodeState::Dead).unwrap();

        assert_eq!(view.get_alive_members().len(), 1);
        assert_eq!(
            view.get_member(&NodeId::from("b")).unwrap().state,
            NodeState::Dead
        );
    }

    #[test]
    fn test_local_node_cannot_be_replaced() {
        let view = ClusterView::new(node("a", 6000));

        let result = view.add_member(node("a", 7000));

        assert!(result.is_err());
        assert_eq!(view.local_node.http_addr.port(), 6000);
    }

    #[test]
    fn test_set_state_unknown_member_fails() {
        let view = ClusterView::new(node("a", 6000));

        let result = view.set_state(&NodeId::from("ghost"), NodeState::Suspect);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Unknown member"));
    }
}
