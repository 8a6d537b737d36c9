//! 监控面测试：/stats、/health、/cleanup

mod support;

use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;

use support::{serve, TestApp};

#[tokio::test]
async fn stats_endpoint_serves_cached_snapshot() {
    let app = TestApp::new().await;
    app.presence
        .add_user_to_room("sala", "alice", "Alice")
        .await
        .unwrap();

    let addr = serve(app.router.clone()).await;
    let client = Client::new();

    let first: serde_json::Value = client
        .get(format!("http://{}/stats", addr))
        .send()
        .await
        .expect("stats")
        .json()
        .await
        .expect("json");
    assert_eq!(first["stats"]["totalRooms"], 1);
    assert_eq!(first["stats"]["totalUsers"], 1);
    assert_eq!(first["stats"]["serverLoad"]["serverId"], "test-server");
    assert!(first["timestamp"].is_string());

    // 缓存窗口内第二次调用返回同一份快照，即便状态已经变化
    app.presence
        .add_user_to_room("sala", "bob", "Bob")
        .await
        .unwrap();
    let second: serde_json::Value = client
        .get(format!("http://{}/stats", addr))
        .send()
        .await
        .expect("stats")
        .json()
        .await
        .expect("json");
    assert_eq!(second["stats"], first["stats"]);
}

#[tokio::test]
async fn health_probe_is_rate_limited() {
    let app = TestApp::new().await;
    let addr = serve(app.router.clone()).await;
    let client = Client::new();

    // 第一次探测通过
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("health");
    assert_eq!(response.status().as_u16(), 200);

    // 窗口内的第二次探测被限流，按失败关闭语义报不可用
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("health");
    assert_eq!(response.status().as_u16(), 503);

    // 窗口过后恢复
    sleep(Duration::from_millis(1100)).await;
    let response = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("health");
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn health_reports_unavailable_on_store_outage() {
    let app = TestApp::new().await;
    app.store.set_fail_mode(true);
    let addr = serve(app.router.clone()).await;

    let response = Client::new()
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .expect("health");
    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn cleanup_endpoint_triggers_sweep() {
    let app = TestApp::new().await;
    // 直接注入一条解析不了的输入记录，清理扫描应当移除它
    app.store
        .inject_hash_entry("room:sala:typing", "mallory", "garbage")
        .await;

    let addr = serve(app.router.clone()).await;
    let response: serde_json::Value = Client::new()
        .post(format!("http://{}/cleanup", addr))
        .send()
        .await
        .expect("cleanup")
        .json()
        .await
        .expect("json");
    assert_eq!(response["removed"], 1);
}
