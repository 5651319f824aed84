use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::fanout::DeliveryReport;
use crate::server::AppState;

/// Manual broadcast body; forwarded to clients unchanged
#[derive(Debug, Deserialize, Serialize)]
pub struct BroadcastRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// POST /api/v1/broadcast
#[tracing::instrument(name = "api.broadcast", skip(state, request), fields(kind = %request.kind))]
pub async fn broadcast(
    State(state): State<AppState>,
    Json(request): Json<BroadcastRequest>,
) -> Result<Json<DeliveryReport>> {
    if request.kind.trim().is_empty() {
        return Err(AppError::Validation("type must not be empty".to_string()));
    }

    let report = state.engine.broadcast_message(&request).await?;
    Ok(Json(report))
}
