use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::memory::RowStore;
use super::protocol::{PutRowRequest, PutRowResponse};

pub async fn handle_put_row(
    Extension(store): Extension<Arc<RowStore>>,
    Json(req): Json<PutRowRequest>,
) -> (StatusCode, Json<PutRowResponse>) {
    match store.put(&req.table, &req.key, req.row) {
        Ok(partition) => (
            StatusCode::OK,
            Json(PutRowResponse {
                success: true,
                partition: Some(partition),
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to store row {}: {}", req.key, e);
            (
                StatusCode::BAD_REQUEST,
                Json(PutRowResponse {
                    success: false,
                    partition: None,
                }),
            )
        }
    }
}
