//! 主应用程序入口
//!
//! 装配依赖并启动 Axum 服务。所有服务实例在这里构建一次、
//! 显式注入，没有环境全局量；周期清理的调度也由这里负责，
//! 核心只暴露可调用的入口。

use std::sync::Arc;
use std::time::Duration;

use application::{
    FanoutDependencies, MessageFanoutService, PresenceConfig, RoomPresenceService, SystemClock,
};
use config::AppConfig;
use infrastructure::{
    create_pg_pool, LocalEventDispatcher, LocalFileStorage, PgMessageRepository,
    PgRoomMemberRepository, PgUnreadMarkerRepository, RedisConfig, RedisEventDispatcher,
    RedisEventSubscriber, RedisPresenceStore,
};
use tracing_subscriber::EnvFilter;
use web_api::{AppState, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let app_config = AppConfig::load()?;

    // PostgreSQL
    let pg_pool = create_pg_pool(&app_config.database.url).await?;
    sqlx::migrate!("../../migrations").run(&pg_pool).await?;

    // Redis：在线状态存储和事件复制共用一个客户端
    let redis_client = Arc::new(redis::Client::open(app_config.redis.url.as_str())?);
    let store = Arc::new(RedisPresenceStore::new(redis_client.clone()));

    let clock = Arc::new(SystemClock);
    let presence_config = PresenceConfig {
        server_id: app_config
            .presence
            .server_id
            .clone()
            .unwrap_or_else(|| format!("server-{}", uuid::Uuid::new_v4())),
        room_users_ttl: Duration::from_secs(app_config.presence.room_users_ttl_secs),
        active_viewer_ttl: Duration::from_secs(app_config.presence.active_viewer_ttl_secs),
        typing_ttl: Duration::from_secs(app_config.presence.typing_ttl_secs),
        stats_cache_ttl: Duration::from_secs(app_config.presence.stats_cache_ttl_secs),
        typing_stale_after: chrono_duration(app_config.presence.typing_stale_after_secs),
        cleanup_scan_limit: app_config.presence.cleanup_scan_limit,
        ..PresenceConfig::default()
    };
    let presence = Arc::new(RoomPresenceService::new(
        store,
        clock.clone(),
        presence_config,
    ));

    // 事件分发：进程内广播，按配置叠加 Redis 跨实例复制
    let broadcaster = LocalEventDispatcher::new(app_config.broadcast.capacity);
    let dispatcher: Arc<dyn application::EventDispatcher> = if app_config.broadcast.replicate {
        let redis_config = RedisConfig {
            url: app_config.redis.url.clone(),
            ..RedisConfig::default()
        };
        let subscriber = RedisEventSubscriber::new(
            redis_client.clone(),
            redis_config.clone(),
            broadcaster.clone(),
        );
        tokio::spawn(subscriber.run());
        Arc::new(RedisEventDispatcher::new(redis_client, redis_config))
    } else {
        Arc::new(broadcaster.clone())
    };

    // 扇出协调器
    let members = Arc::new(PgRoomMemberRepository::new(pg_pool.clone()));
    let fanout = Arc::new(MessageFanoutService::new(FanoutDependencies {
        messages: Arc::new(PgMessageRepository::new(pg_pool.clone())),
        members: members.clone(),
        unread: Arc::new(PgUnreadMarkerRepository::new(pg_pool)),
        files: Arc::new(LocalFileStorage::new(&app_config.server.upload_root)),
        presence: presence.clone(),
        clock,
    }));

    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: app_config.jwt.secret.clone(),
        expiration_hours: app_config.jwt.expiration_hours,
    }));

    // 周期清理由外部调度器驱动，核心只暴露入口
    let cleanup_presence = presence.clone();
    let cleanup_interval = Duration::from_secs(app_config.presence.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        interval.tick().await; // 第一个 tick 立即返回，跳过
        loop {
            interval.tick().await;
            match cleanup_presence.cleanup_expired_data().await {
                Ok(removed) => {
                    tracing::debug!(removed, "scheduled presence cleanup finished");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "scheduled presence cleanup failed");
                }
            }
        }
    });

    let state = AppState::new(presence, fanout, members, dispatcher, broadcaster, jwt);
    let app = web_api::router(state);

    let bind_addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("chatrelay listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn chrono_duration(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs as i64)
}
