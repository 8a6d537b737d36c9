//! 在线状态服务测试

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::clock::{ManualClock, SystemClock};
use crate::presence::{PresenceConfig, RoomPresenceService};
use crate::store::memory::MemoryPresenceStore;

fn service_with(
    store: Arc<MemoryPresenceStore>,
    config: PresenceConfig,
) -> RoomPresenceService {
    RoomPresenceService::new(store, Arc::new(SystemClock), config)
}

fn default_service() -> (Arc<MemoryPresenceStore>, RoomPresenceService) {
    let store = Arc::new(MemoryPresenceStore::new());
    let service = service_with(store.clone(), PresenceConfig::default());
    (store, service)
}

#[tokio::test]
async fn add_then_read_returns_single_record() {
    let (_, service) = default_service();
    service.add_user_to_room("sala", "alice", "Alice").await.unwrap();

    let users = service.get_room_users("sala").await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "alice");
    assert_eq!(users[0].username, "Alice");
    assert!(!users[0].server_id.is_empty());
    assert_eq!(service.get_user_room_count("sala").await, 1);
}

#[tokio::test]
async fn add_is_overwrite_not_duplicate() {
    let (_, service) = default_service();
    service.add_user_to_room("sala", "alice", "Alice").await.unwrap();
    service.add_user_to_room("sala", "alice", "Alice2").await.unwrap();

    let users = service.get_room_users("sala").await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "Alice2");
}

#[tokio::test]
async fn remove_absent_user_is_noop() {
    let (_, service) = default_service();
    service.remove_user_from_room("sala", "ghost").await.unwrap();
    assert_eq!(service.get_user_room_count("sala").await, 0);
}

#[tokio::test]
async fn raw_and_sanitized_ids_resolve_consistently() {
    let (_, service) = default_service();
    service
        .add_user_to_room("room@#$123", "user!1", "Alice")
        .await
        .unwrap();

    // 原始和清洗后的 id 都命中同一份记录
    assert_eq!(service.get_room_users("room@#$123").await.len(), 1);
    assert_eq!(service.get_room_users("room123").await.len(), 1);
    assert_eq!(service.get_user_room_count("room123").await, 1);

    service.remove_user_from_room("room123", "user1").await.unwrap();
    assert_eq!(service.get_room_users("room@#$123").await.len(), 0);
}

#[tokio::test]
async fn invalid_ids_rejected_before_store() {
    let (_, service) = default_service();
    assert!(service.add_user_to_room("", "alice", "Alice").await.is_err());
    assert!(service
        .add_user_to_room("sala", &"x".repeat(1001), "Alice")
        .await
        .is_err());
    assert!(service.add_user_to_room("sala", "alice", "").await.is_err());

    // 非法 roomId 的读取返回空，不触达存储
    assert!(service.get_room_users("").await.is_empty());
    assert_eq!(service.get_user_room_count("").await, 0);
}

#[tokio::test]
async fn corrupt_record_is_dropped_not_fatal() {
    let (store, service) = default_service();
    service.add_user_to_room("sala", "alice", "Alice").await.unwrap();
    store
        .inject_hash_entry("room:sala:users", "mallory", "not-json{{{")
        .await;

    let users = service.get_room_users("sala").await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "alice");
}

#[tokio::test]
async fn reads_fail_open_on_store_outage() {
    let (store, service) = default_service();
    service.add_user_to_room("sala", "alice", "Alice").await.unwrap();
    store.set_fail_mode(true);

    assert!(service.get_room_users("sala").await.is_empty());
    assert_eq!(service.get_user_room_count("sala").await, 0);
    assert!(!service.is_user_active_viewer("sala", "alice").await);
    assert!(service.get_active_viewers("sala").await.is_empty());
    assert!(service.get_typing_users("sala").await.is_empty());

    // 写路径必须抛错而不是静默吞掉
    assert!(service.add_user_to_room("sala", "bob", "Bob").await.is_err());
}

#[tokio::test]
async fn viewer_add_is_idempotent() {
    let (_, service) = default_service();
    service.add_active_viewer("sala", "alice").await.unwrap();
    service.add_active_viewer("sala", "alice").await.unwrap();

    assert_eq!(service.get_active_viewers("sala").await.len(), 1);
    assert!(service.is_user_active_viewer("sala", "alice").await);

    service.remove_active_viewer("sala", "alice").await.unwrap();
    assert!(!service.is_user_active_viewer("sala", "alice").await);
}

#[tokio::test]
async fn typing_records_round_trip() {
    let (_, service) = default_service();
    service.set_user_typing("sala", "alice", "Alice").await.unwrap();

    let typing = service.get_typing_users("sala").await;
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].user_id, "alice");

    service.remove_user_typing("sala", "alice").await.unwrap();
    assert!(service.get_typing_users("sala").await.is_empty());
}

#[tokio::test]
async fn typing_expires_with_ttl() {
    let store = Arc::new(MemoryPresenceStore::new());
    let service = service_with(
        store,
        PresenceConfig {
            typing_ttl: Duration::from_millis(40),
            ..PresenceConfig::default()
        },
    );
    service.set_user_typing("sala", "alice", "Alice").await.unwrap();
    assert_eq!(service.get_typing_users("sala").await.len(), 1);

    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(service.get_typing_users("sala").await.is_empty());
}

#[tokio::test]
async fn rate_limit_window() {
    let (_, service) = default_service();
    let window = Duration::from_millis(100);

    assert!(service.check_rate_limit("alice", "ping", 1, window).await);
    assert!(!service.check_rate_limit("alice", "ping", 1, window).await);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(service.check_rate_limit("alice", "ping", 1, window).await);
}

#[tokio::test]
async fn rate_limit_fails_closed() {
    let (store, service) = default_service();
    let window = Duration::from_secs(1);

    // 非法参数拒绝
    assert!(!service.check_rate_limit("", "ping", 1, window).await);
    assert!(!service.check_rate_limit("alice", "ping", 0, window).await);

    // 存储故障拒绝
    store.set_fail_mode(true);
    assert!(!service.check_rate_limit("alice", "ping", 100, window).await);
}

#[tokio::test]
async fn rate_limit_isolated_per_actor_and_action() {
    let (_, service) = default_service();
    let window = Duration::from_secs(5);

    assert!(service.check_rate_limit("alice", "typing", 1, window).await);
    // 不同的 actor 或 action 各有独立的计数器
    assert!(service.check_rate_limit("bob", "typing", 1, window).await);
    assert!(service.check_rate_limit("alice", "ping", 1, window).await);
    assert!(!service.check_rate_limit("alice", "typing", 1, window).await);
}

#[tokio::test]
async fn cleanup_sweeps_stale_typing_entries() {
    let store = Arc::new(MemoryPresenceStore::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let service = RoomPresenceService::new(
        store.clone(),
        clock.clone(),
        PresenceConfig {
            // 测试中把 TTL 放大，让清理扫描成为唯一的过期机制
            typing_ttl: Duration::from_secs(3600),
            ..PresenceConfig::default()
        },
    );

    service.set_user_typing("sala", "alice", "Alice").await.unwrap();
    clock.advance(chrono::Duration::minutes(6));
    service.set_user_typing("sala", "bob", "Bob").await.unwrap();

    // alice 的记录已超过 5 分钟过期窗口，bob 的还新鲜
    let removed = service.cleanup_expired_data().await.unwrap();
    assert_eq!(removed, 1);
    let typing = service.get_typing_users("sala").await;
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].user_id, "bob");
}

#[tokio::test]
async fn cleanup_drops_unparseable_entries() {
    let store = Arc::new(MemoryPresenceStore::new());
    let service = service_with(store.clone(), PresenceConfig::default());
    store
        .inject_hash_entry("room:sala:typing", "mallory", "garbage")
        .await;

    let removed = service.cleanup_expired_data().await.unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn system_stats_aggregates_all_rooms() {
    let (_, service) = default_service();
    service.add_user_to_room("sala1", "alice", "Alice").await.unwrap();
    service.add_user_to_room("sala1", "bob", "Bob").await.unwrap();
    service.add_user_to_room("sala2", "carol", "Carol").await.unwrap();
    service.add_active_viewer("sala1", "alice").await.unwrap();
    service.set_user_typing("sala2", "carol", "Carol").await.unwrap();

    let stats = service.get_system_stats().await;
    assert_eq!(stats.total_rooms, 2);
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.total_active_viewers, 1);
    assert_eq!(stats.total_typing_users, 1);
    assert_eq!(stats.server_load.server_id, service.server_id());
}

#[tokio::test]
async fn system_stats_cached_within_window() {
    let store = Arc::new(MemoryPresenceStore::new());
    let service = service_with(
        store,
        PresenceConfig {
            stats_cache_ttl: Duration::from_millis(200),
            ..PresenceConfig::default()
        },
    );
    service.add_user_to_room("sala", "alice", "Alice").await.unwrap();

    // 缓存窗口内两次调用结果完全一致
    let first = service.get_system_stats().await;
    service.add_user_to_room("sala", "bob", "Bob").await.unwrap();
    let second = service.get_system_stats().await;
    assert_eq!(first, second);

    // 窗口过期后重新计算
    tokio::time::sleep(Duration::from_millis(250)).await;
    let third = service.get_system_stats().await;
    assert_eq!(third.total_users, 2);
}

#[tokio::test]
async fn system_stats_zeroed_on_outage() {
    let (store, service) = default_service();
    service.add_user_to_room("sala", "alice", "Alice").await.unwrap();
    store.set_fail_mode(true);

    let stats = service.get_system_stats().await;
    assert_eq!(stats.total_rooms, 0);
    assert_eq!(stats.total_users, 0);
    assert_eq!(stats.server_load.server_id, service.server_id());
}
