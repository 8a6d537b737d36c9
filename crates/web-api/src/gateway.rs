//! 实时连接网关
//!
//! 传输层会话管理：每个新连接用与 HTTP API 相同的 JWT 方案
//! 认证，把固定的一组客户端事件翻译成在线状态服务/扇出协调器
//! 调用，并把服务端事件按房间频道或用户私有频道过滤后发往
//! 订阅的 socket。
//!
//! 连接断开时必须把用户从它加入过的每个房间的在线/查看/输入
//! 集合中移除；只靠 TTL 过期会让失效的"在线"指示残留最长 24h。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use application::{Address, AddressedEvent, ChatEvent};

use crate::state::AppState;

/// 输入事件的限流配额：每 10 秒最多 30 次按键级调用
const TYPING_RATE_LIMIT: u64 = 30;
const TYPING_RATE_WINDOW: Duration = Duration::from_secs(10);

/// WebSocket 连接查询参数
#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: String,
}

/// 客户端发来的事件
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum ClientEvent {
    JoinRoom { room_id: String },
    LeaveRoom { room_id: String },
    StartViewingRoom { room_id: String },
    StopViewingRoom { room_id: String },
    StartTyping {
        room_id: String,
        user_id: Option<String>,
    },
    StopTyping {
        room_id: String,
        user_id: Option<String>,
    },
}

/// 发回给发起方的错误确认；连接保持打开
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorAck {
    event: &'static str,
    code: &'static str,
    message: String,
}

impl ErrorAck {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            event: "error",
            code,
            message: message.into(),
        }
    }
}

/// 处理 WebSocket 连接升级
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
) -> Result<Response, StatusCode> {
    let claims = state.jwt.validate_token(&query.token).map_err(|err| {
        warn!(error = %err, "websocket upgrade rejected: invalid token");
        StatusCode::UNAUTHORIZED
    })?;

    info!(user_id = %claims.sub, "websocket upgrade");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims.sub, claims.username)))
}

/// 单个连接的会话
struct GatewaySession {
    state: AppState,
    user_id: String,
    username: String,
    /// 该连接加入的房间；出站过滤和断开清理都依赖它
    joined_rooms: Arc<RwLock<HashSet<String>>>,
    outbound: mpsc::UnboundedSender<String>,
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: String, username: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

    let session = Arc::new(GatewaySession {
        state: state.clone(),
        user_id: user_id.clone(),
        username,
        joined_rooms: Arc::new(RwLock::new(HashSet::new())),
        outbound: outbound_tx,
    });

    // 发送任务：会话产生的所有帧从这里流向 socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if ws_sender.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    // 订阅任务：按加入的房间和自己的用户频道过滤广播流
    let broadcast_session = session.clone();
    let mut broadcast_rx = state.broadcaster.subscribe();
    let mut broadcast_task = tokio::spawn(async move {
        loop {
            match broadcast_rx.recv().await {
                Ok(addressed) => {
                    if broadcast_session.should_deliver(&addressed).await {
                        broadcast_session.send_event(&addressed.event);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    // 慢接收者跳过积压的事件；实时状态过期即弃
                    warn!(skipped, "gateway connection lagged behind broadcast");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // 接收任务：客户端事件翻译成服务调用
    let recv_session = session.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    recv_session.handle_text(text.to_string()).await;
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Binary(_)) => {
                    debug!("binary frames are not supported");
                }
                Ok(WsMessage::Close(_)) => break,
                Err(err) => {
                    debug!(error = %err, "websocket receive error");
                    break;
                }
            }
        }
    });

    // 任一任务退出即结束会话
    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut broadcast_task => {},
        _ = &mut recv_task => {},
    }
    send_task.abort();
    broadcast_task.abort();
    recv_task.abort();

    session.cleanup_on_disconnect().await;
    info!(user_id = %user_id, "websocket connection closed");
}

impl GatewaySession {
    async fn should_deliver(&self, addressed: &AddressedEvent) -> bool {
        match &addressed.address {
            Address::Room(room_id) => self.joined_rooms.read().await.contains(room_id),
            Address::User(user_id) => *user_id == self.user_id,
        }
    }

    fn send_event(&self, event: &ChatEvent) {
        match serde_json::to_string(event) {
            Ok(frame) => {
                // 发送端关闭说明连接正在收尾，丢弃即可
                let _ = self.outbound.send(frame);
            }
            Err(err) => {
                error!(error = %err, "failed to serialize outbound event");
            }
        }
    }

    fn send_error(&self, code: &'static str, message: impl Into<String>) {
        if let Ok(frame) = serde_json::to_string(&ErrorAck::new(code, message)) {
            let _ = self.outbound.send(frame);
        }
    }

    async fn handle_text(&self, text: String) {
        let event: ClientEvent = match serde_json::from_str(&text) {
            Ok(event) => event,
            Err(err) => {
                self.send_error("BAD_EVENT", format!("unrecognized event: {err}"));
                return;
            }
        };

        match event {
            ClientEvent::JoinRoom { room_id } => self.handle_join(room_id).await,
            ClientEvent::LeaveRoom { room_id } => self.handle_leave(room_id).await,
            ClientEvent::StartViewingRoom { room_id } => {
                if let Err(err) = self
                    .state
                    .presence
                    .add_active_viewer(&room_id, &self.user_id)
                    .await
                {
                    self.send_error("START_VIEWING_FAILED", err.to_string());
                }
            }
            ClientEvent::StopViewingRoom { room_id } => {
                if let Err(err) = self
                    .state
                    .presence
                    .remove_active_viewer(&room_id, &self.user_id)
                    .await
                {
                    self.send_error("STOP_VIEWING_FAILED", err.to_string());
                }
            }
            ClientEvent::StartTyping { room_id, user_id } => {
                if !self.check_claimed_user(user_id) {
                    return;
                }
                self.handle_start_typing(room_id).await;
            }
            ClientEvent::StopTyping { room_id, user_id } => {
                if !self.check_claimed_user(user_id) {
                    return;
                }
                self.handle_stop_typing(room_id).await;
            }
        }
    }

    /// 载荷里声明的 userId 必须与认证身份一致
    fn check_claimed_user(&self, claimed: Option<String>) -> bool {
        match claimed {
            Some(claimed) if claimed != self.user_id => {
                self.send_error("FORBIDDEN", "userId does not match authenticated user");
                false
            }
            _ => true,
        }
    }

    async fn handle_join(&self, room_id: String) {
        // 纵深防御：房间成员关系由持久层裁决
        match self.state.members.is_member(&room_id, &self.user_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.send_error("JOIN_ROOM_FAILED", "not a room member");
                return;
            }
            Err(err) => {
                self.send_error("JOIN_ROOM_FAILED", err.to_string());
                return;
            }
        }

        if let Err(err) = self
            .state
            .presence
            .add_user_to_room(&room_id, &self.user_id, &self.username)
            .await
        {
            self.send_error("JOIN_ROOM_FAILED", err.to_string());
            return;
        }
        self.joined_rooms.write().await.insert(room_id.clone());

        let users = self.state.presence.get_room_users(&room_id).await;
        let user = users
            .iter()
            .find(|record| record.user_id == domain::sanitize_key_part(&self.user_id))
            .cloned();
        let count = users.len() as u64;

        let mut events = Vec::new();
        if let Some(user) = user {
            events.push(AddressedEvent::room(
                room_id.clone(),
                ChatEvent::UserJoinedRoom {
                    room_id: room_id.clone(),
                    user,
                },
            ));
        }
        events.push(AddressedEvent::room(
            room_id.clone(),
            ChatEvent::RoomUsersUpdated {
                room_id,
                users,
                count,
            },
        ));
        if let Err(err) = self.state.dispatcher.dispatch_all(events).await {
            warn!(error = %err, "join fanout failed");
        }
    }

    async fn handle_leave(&self, room_id: String) {
        self.joined_rooms.write().await.remove(&room_id);
        self.remove_room_presence(&room_id).await;
        self.emit_departure(&room_id).await;
    }

    async fn handle_start_typing(&self, room_id: String) {
        // 输入事件是按键级的，先过限流再触达存储
        if !self
            .state
            .presence
            .check_rate_limit(&self.user_id, "typing", TYPING_RATE_LIMIT, TYPING_RATE_WINDOW)
            .await
        {
            self.send_error("RATE_LIMITED", "too many typing events");
            return;
        }

        if let Err(err) = self
            .state
            .presence
            .set_user_typing(&room_id, &self.user_id, &self.username)
            .await
        {
            self.send_error("START_TYPING_FAILED", err.to_string());
            return;
        }

        let event = AddressedEvent::room(
            room_id.clone(),
            ChatEvent::UserStartTyping {
                room_id,
                user_id: self.user_id.clone(),
                username: self.username.clone(),
            },
        );
        if let Err(err) = self.state.dispatcher.dispatch(event).await {
            warn!(error = %err, "typing fanout failed");
        }
    }

    async fn handle_stop_typing(&self, room_id: String) {
        if let Err(err) = self
            .state
            .presence
            .remove_user_typing(&room_id, &self.user_id)
            .await
        {
            self.send_error("STOP_TYPING_FAILED", err.to_string());
            return;
        }

        let event = AddressedEvent::room(
            room_id.clone(),
            ChatEvent::UserStopTyping {
                room_id,
                user_id: self.user_id.clone(),
            },
        );
        if let Err(err) = self.state.dispatcher.dispatch(event).await {
            warn!(error = %err, "typing fanout failed");
        }
    }

    /// 把用户从一个房间的全部三个在线结构中移除
    async fn remove_room_presence(&self, room_id: &str) {
        if let Err(err) = self
            .state
            .presence
            .remove_user_from_room(room_id, &self.user_id)
            .await
        {
            warn!(room_id, error = %err, "presence removal failed");
        }
        if let Err(err) = self
            .state
            .presence
            .remove_active_viewer(room_id, &self.user_id)
            .await
        {
            warn!(room_id, error = %err, "viewer removal failed");
        }
        if let Err(err) = self
            .state
            .presence
            .remove_user_typing(room_id, &self.user_id)
            .await
        {
            warn!(room_id, error = %err, "typing removal failed");
        }
    }

    async fn emit_departure(&self, room_id: &str) {
        let users = self.state.presence.get_room_users(room_id).await;
        let count = users.len() as u64;
        let events = vec![
            AddressedEvent::room(
                room_id.to_string(),
                ChatEvent::UserLeftRoom {
                    room_id: room_id.to_string(),
                    user_id: self.user_id.clone(),
                },
            ),
            AddressedEvent::room(
                room_id.to_string(),
                ChatEvent::RoomUsersUpdated {
                    room_id: room_id.to_string(),
                    users,
                    count,
                },
            ),
        ];
        if let Err(err) = self.state.dispatcher.dispatch_all(events).await {
            warn!(error = %err, "departure fanout failed");
        }
    }

    /// 断开清理：把用户从它加入过的每个房间的在线/查看/输入
    /// 集合中移除并广播离开事件
    async fn cleanup_on_disconnect(&self) {
        let rooms: Vec<String> = self.joined_rooms.read().await.iter().cloned().collect();
        for room_id in rooms {
            self.remove_room_presence(&room_id).await;
            self.emit_departure(&room_id).await;
        }
    }
}
