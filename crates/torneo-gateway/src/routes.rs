//! Gateway route handlers: JSON in, bridge call, JSON out.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use torneo_core::error::TorneoError;

use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScoreRequest {
    pub member_id: String,
    pub points: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMemberRequest {
    pub member_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetStageRequest {
    pub stage: u32,
}

type ApiResult = (StatusCode, Json<serde_json::Value>);

fn ok(body: serde_json::Value) -> ApiResult {
    (StatusCode::OK, Json(body))
}

fn fail(err: TorneoError) -> ApiResult {
    let status = match &err {
        TorneoError::Validation(_) => StatusCode::BAD_REQUEST,
        TorneoError::NotFound(_) => StatusCode::NOT_FOUND,
        TorneoError::Authorization => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("gateway request failed: {err}");
    }
    (status, Json(serde_json::json!({"ok": false, "error": err.to_string()})))
}

/// Adjust a member's score by a signed delta. Creates the participant on
/// first touch, same as the chat command.
pub async fn update_score(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateScoreRequest>,
) -> ApiResult {
    match state.bridge.api_adjust_score(&body.member_id, body.points).await {
        Ok(total) => ok(serde_json::json!({
            "ok": true,
            "memberId": body.member_id,
            "points": total,
        })),
        Err(e) => fail(e),
    }
}

/// Remove a participant. Removing an absent member still reports success.
pub async fn delete_member(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DeleteMemberRequest>,
) -> ApiResult {
    match state.bridge.api_remove_member(&body.member_id).await {
        Ok(()) => ok(serde_json::json!({"ok": true, "memberId": body.member_id})),
        Err(e) => fail(e),
    }
}

/// Override the stage counter.
pub async fn set_stage(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetStageRequest>,
) -> ApiResult {
    match state.bridge.api_set_stage(body.stage).await {
        Ok(()) => ok(serde_json::json!({"ok": true, "stage": body.stage})),
        Err(e) => fail(e),
    }
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "torneo-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// System information endpoint.
pub async fn system_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "platform": format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "gateway": {
            "host": state.gateway_config.host,
            "port": state.gateway_config.port,
        }
    }))
}
