//! HTTP 路由
//!
//! 消息边界（创建/编辑/删除/已读，薄封装：协调器调用后
//! 交给分发器发送）和监控面（/stats、/health、/cleanup）。

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use application::CreateMessageCommand;
use domain::Attachment;

use crate::{auth::Claims, error::ApiError, gateway, state::AppState};

/// 健康探测的限流配额：每秒 1 次
const HEALTH_PROBE_LIMIT: u64 = 1;
const HEALTH_PROBE_WINDOW: Duration = Duration::from_secs(1);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(gateway::ws_handler))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/cleanup", post(cleanup))
        .nest("/api/v1", api_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/rooms/{room_id}/messages", post(create_message))
        .route("/rooms/{room_id}/read", post(mark_read))
        .route(
            "/messages/{message_id}",
            patch(update_message).delete(delete_message),
        )
}

/// 从 Authorization 头解析 Bearer 令牌
fn bearer_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("expected bearer token"))?;
    state
        .jwt
        .validate_token(token)
        .map_err(|err| ApiError::unauthorized(err.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentPayload {
    file_name: String,
    mime_type: String,
    size_bytes: u64,
    storage_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMessagePayload {
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Deserialize)]
struct UpdateMessagePayload {
    content: String,
}

async fn create_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateMessagePayload>,
) -> Result<Json<domain::Message>, ApiError> {
    let claims = bearer_claims(&state, &headers)?;

    let attachments = payload
        .attachments
        .into_iter()
        .map(|a| Attachment::new(a.file_name, a.mime_type, a.size_bytes, a.storage_path))
        .collect();

    let outcome = state
        .fanout
        .create_message(CreateMessageCommand {
            room_id,
            author_id: claims.sub,
            author_username: claims.username,
            content: payload.content,
            attachments,
        })
        .await?;

    // 持久化已经完成，事件现在才离开进程
    state.dispatcher.dispatch_all(outcome.events).await?;
    Ok(Json(outcome.message))
}

async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMessagePayload>,
) -> Result<Json<domain::Message>, ApiError> {
    let claims = bearer_claims(&state, &headers)?;

    let outcome = state
        .fanout
        .update_message(message_id, &payload.content, &claims.sub)
        .await?;

    state.dispatcher.dispatch_all(outcome.events).await?;
    Ok(Json(outcome.message))
}

async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<domain::Message>, ApiError> {
    let claims = bearer_claims(&state, &headers)?;

    let outcome = state.fanout.delete_message(message_id, &claims.sub).await?;

    state.dispatcher.dispatch_all(outcome.events).await?;
    Ok(Json(outcome.message))
}

async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let claims = bearer_claims(&state, &headers)?;

    let events = state
        .fanout
        .mark_messages_as_read(&claims.sub, &room_id)
        .await?;

    state.dispatcher.dispatch_all(events).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// 存活检查：对存储做一次 1 req/s 限流探测。探测被拒绝
/// （限流窗口未过或存储不可达）按失败关闭语义报不可用。
async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let probe_actor = format!("health:{}", state.presence.server_id());
    let allowed = state
        .presence
        .check_rate_limit(&probe_actor, "ping", HEALTH_PROBE_LIMIT, HEALTH_PROBE_WINDOW)
        .await;

    if allowed {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(ApiError::service_unavailable("store probe denied"))
    }
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.presence.get_system_stats().await;
    Json(json!({
        "stats": stats,
        "timestamp": chrono::Utc::now(),
    }))
}

async fn cleanup(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.presence.cleanup_expired_data().await?;
    Ok(Json(json!({ "removed": removed })))
}
