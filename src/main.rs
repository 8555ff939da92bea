use axum::{Router, extract::Extension, routing::post};
use reduce_cluster::membership::service::ClusterView;
use reduce_cluster::membership::types::{Node, NodeId};
use reduce_cluster::query::engine::QueryEngine;
use reduce_cluster::query::handlers::{handle_internal_reduce, handle_reduce_remote};
use reduce_cluster::query::node::QueryNode;
use reduce_cluster::query::protocol::{ENDPOINT_INTERNAL_REDUCE, ENDPOINT_REDUCE_REMOTE};
use reduce_cluster::query::registry::ReducerRegistry;
use reduce_cluster::query::stock::{COUNT, CountFactory, SUM_COUNT, SumCountFactory};
use reduce_cluster::query::transport::HttpTransport;
use reduce_cluster::query::types::{EngineConfig, FailurePolicy};
use reduce_cluster::storage::handlers::handle_put_row;
use reduce_cluster::storage::memory::RowStore;
use reduce_cluster::storage::partitioner::PartitionManager;
use reduce_cluster::storage::protocol::ENDPOINT_PUT_ROW;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--id <name>] [--node <id>@<addr:port>]... [--tolerate-failures]",
            args[0]
        );
        eprintln!("Example: {} --bind 127.0.0.1:6000 --id a", args[0]);
        eprintln!(
            "Example: {} --bind 127.0.0.1:6001 --id b --node a@127.0.0.1:6000",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut node_id: Option<NodeId> = None;
    let mut peers: Vec<Node> = vec![];
    let mut failure_policy = FailurePolicy::FailFast;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" if i + 1 < args.len() => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--id" if i + 1 < args.len() => {
                node_id = Some(NodeId::from(args[i + 1].as_str()));
                i += 2;
            }
            "--node" if i + 1 < args.len() => {
                peers.push(parse_peer(&args[i + 1])?);
                i += 2;
            }
            "--tolerate-failures" => {
                failure_policy = FailurePolicy::TolerateFailures;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.ok_or_else(|| anyhow::anyhow!("--bind is required"))?;
    let node_id = node_id.unwrap_or_default();

    tracing::info!("Starting node {} on {}", node_id, bind_addr);

    // 1. Cluster view (static peers):
    let cluster = ClusterView::new(Node::alive(node_id.clone(), bind_addr));
    for peer in peers {
        cluster.add_member(peer)?;
    }
    tracing::info!("Cluster has {} alive nodes", cluster.get_alive_members().len());

    // 2. Storage layer:
    let partitioner = Arc::new(PartitionManager::default());
    let store = Arc::new(RowStore::new(partitioner));

    // 3. Named remote reducers, identical on every node:
    let registry = ReducerRegistry::new();
    registry.register(SUM_COUNT, SumCountFactory);
    registry.register(COUNT, CountFactory);

    // 4. Query engine and internode endpoint:
    let config = EngineConfig {
        failure_policy,
        ..EngineConfig::default()
    };
    let transport = Arc::new(HttpTransport::new(config.dispatch_timeout, config.retry_attempts));
    let engine = QueryEngine::new(cluster.clone(), store.clone(), transport, config);
    let query_node = Arc::new(QueryNode::new(node_id, store.clone(), registry.clone()));

    // 5. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_PUT_ROW, post(handle_put_row))
        .route(ENDPOINT_INTERNAL_REDUCE, post(handle_internal_reduce))
        .route(ENDPOINT_REDUCE_REMOTE, post(handle_reduce_remote))
        .layer(Extension(store))
        .layer(Extension(query_node))
        .layer(Extension(engine))
        .layer(Extension(registry));

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Parses `<id>@<addr:port>`.
fn parse_peer(spec: &str) -> anyhow::Result<Node> {
    let (id, addr) = spec
        .split_once('@')
        .ok_or_else(|| anyhow::anyhow!("Expected <id>@<addr:port>, got '{}'", spec))?;
    Ok(Node::alive(NodeId::from(id), addr.parse()?))
}
