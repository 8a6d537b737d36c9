//! 集成测试支撑：内存实现的完整装配

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use application::repository::memory::{
    MemoryFileStorage, MemoryMessageRepository, MemoryRoomMemberRepository,
    MemoryUnreadMarkerRepository,
};
use application::store::memory::MemoryPresenceStore;
use application::{
    FanoutDependencies, MessageFanoutService, PresenceConfig, RoomPresenceService, SystemClock,
};
use infrastructure::LocalEventDispatcher;
use web_api::{AppState, JwtConfig, JwtService};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestApp {
    pub router: Router,
    pub jwt: Arc<JwtService>,
    pub store: Arc<MemoryPresenceStore>,
    pub presence: Arc<RoomPresenceService>,
    pub members: Arc<MemoryRoomMemberRepository>,
    pub unread: Arc<MemoryUnreadMarkerRepository>,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryPresenceStore::new());
        let clock = Arc::new(SystemClock);
        let presence = Arc::new(RoomPresenceService::new(
            store.clone(),
            clock.clone(),
            PresenceConfig {
                server_id: "test-server".to_string(),
                ..PresenceConfig::default()
            },
        ));

        let members = Arc::new(MemoryRoomMemberRepository::new());
        let unread = Arc::new(MemoryUnreadMarkerRepository::new());
        let fanout = Arc::new(MessageFanoutService::new(FanoutDependencies {
            messages: Arc::new(MemoryMessageRepository::new()),
            members: members.clone(),
            unread: unread.clone(),
            files: Arc::new(MemoryFileStorage::new()),
            presence: presence.clone(),
            clock,
        }));

        let broadcaster = LocalEventDispatcher::new(1024);
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret".to_string(),
            expiration_hours: 1,
        }));

        let state = AppState::new(
            presence.clone(),
            fanout,
            members.clone(),
            Arc::new(broadcaster.clone()),
            broadcaster,
            jwt.clone(),
        );

        Self {
            router: web_api::router(state),
            jwt,
            store,
            presence,
            members,
            unread,
        }
    }

    pub fn token(&self, user_id: &str, username: &str) -> String {
        self.jwt.issue_token(user_id, username).expect("issue token")
    }
}

/// 启动测试服务器，返回监听地址
pub async fn serve(router: Router) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    // 等待服务器就绪
    tokio::time::sleep(Duration::from_millis(50)).await;
    addr
}

pub async fn connect_ws(addr: std::net::SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (ws, _) = connect_async(&url).await.expect("ws connect");
    ws
}

pub async fn send_event(ws: &mut WsClient, payload: serde_json::Value) {
    ws.send(Message::Text(payload.to_string().into()))
        .await
        .expect("ws send");
}

/// 读取下一个指定类型的事件，跳过其余事件
pub async fn next_event(ws: &mut WsClient, event_type: &str) -> serde_json::Value {
    let deadline = Duration::from_secs(2);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
            .unwrap_or_else(|| panic!("socket closed waiting for {event_type}"))
            .expect("ws receive");
        if let Message::Text(text) = msg {
            let value: serde_json::Value = serde_json::from_str(&text).expect("event json");
            if value["event"] == event_type {
                return value;
            }
        }
    }
}

/// 读取下一个事件（任意类型）
pub async fn next_any_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("ws receive");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("event json");
        }
    }
}
