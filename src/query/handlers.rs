use axum::{Extension, Json, http::StatusCode};
use serde_json::Value;
use std::sync::Arc;

use super::engine::QueryEngine;
use super::node::QueryNode;
use super::protocol::{PublicReduceRequest, PublicReduceResponse, ReduceRequest, ReduceResponse};
use super::registry::ReducerRegistry;

/// Serves one target's share of a reduce query issued by another node.
pub async fn handle_internal_reduce(
    Extension(node): Extension<Arc<QueryNode>>,
    Json(req): Json<ReduceRequest>,
) -> (StatusCode, Json<ReduceResponse>) {
    let node_id = node.node_id().clone();
    let failure = |status: StatusCode, error: String| {
        (
            status,
            Json(ReduceResponse {
                node_id: node_id.clone(),
                values: Vec::new(),
                error: Some(error),
            }),
        )
    };

    tracing::debug!(
        "Query {}: scanning '{}' (reducer: {:?})",
        req.query_id,
        req.clause,
        req.reducer
    );

    let prepared = match node.prepare(&req) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!("Query {}: rejected request: {:#}", req.query_id, e);
            return failure(StatusCode::BAD_REQUEST, format!("{:#}", e));
        }
    };

    match node.run(prepared) {
        Ok(values) => (
            StatusCode::OK,
            Json(ReduceResponse {
                node_id: node_id.clone(),
                values,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Query {}: scan failed: {:#}", req.query_id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// Runs `reduce_remote` over all alive nodes with a registered reducer, or
/// returns every matching row when no reducer is named.
pub async fn handle_reduce_remote(
    Extension(engine): Extension<Arc<QueryEngine>>,
    Extension(registry): Extension<Arc<ReducerRegistry>>,
    Json(req): Json<PublicReduceRequest>,
) -> (StatusCode, Json<PublicReduceResponse>) {
    let query = engine
        .for_all()
        .create_reduce_fields_query::<Value, Value>(&req.clause)
        .query_arguments(req.args);

    let query = match &req.reducer {
        Some(name) => {
            let Some(factory) = registry.get(name) else {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(PublicReduceResponse {
                        values: Vec::new(),
                        error: Some(format!("Unknown remote reducer: {}", name)),
                    }),
                );
            };
            match query.remote_reducer_shared(name, factory) {
                Ok(query) => query,
                Err(e) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(PublicReduceResponse {
                            values: Vec::new(),
                            error: Some(e.to_string()),
                        }),
                    );
                }
            }
        }
        None => query,
    };

    match query.reduce_remote().get().await {
        Ok(values) => (
            StatusCode::OK,
            Json(PublicReduceResponse {
                values,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Public reduce failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(PublicReduceResponse {
                    values: Vec::new(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
