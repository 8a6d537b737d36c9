//! 网关端到端流程测试

mod support;

use std::time::Duration;

use application::UnreadMarkerRepository;
use reqwest::Client;
use serde_json::json;
use tokio::time::sleep;

use support::{connect_ws, next_any_event, next_event, send_event, serve, TestApp};

#[tokio::test]
async fn realtime_room_flow() {
    let app = TestApp::new().await;
    app.members.add_member("sala", "alice", "Alice").await;
    app.members.add_member("sala", "bob", "Bob").await;
    // carol 是成员但不连接，只收未读标记
    app.members.add_member("sala", "carol", "Carol").await;

    let addr = serve(app.router.clone()).await;
    let client = Client::new();

    let mut alice = connect_ws(addr, &app.token("alice", "Alice")).await;
    let mut bob = connect_ws(addr, &app.token("bob", "Bob")).await;

    // alice 加入房间，收到自己触发的成员列表更新
    send_event(&mut alice, json!({"event": "join_room", "roomId": "sala"})).await;
    let users_updated = next_event(&mut alice, "room_users_updated").await;
    assert_eq!(users_updated["count"], 1);

    // bob 加入，alice 看到加入事件
    send_event(&mut bob, json!({"event": "join_room", "roomId": "sala"})).await;
    let joined = next_event(&mut alice, "user_joined_room").await;
    assert_eq!(joined["user"]["userId"], "bob");
    let users_updated = next_event(&mut alice, "room_users_updated").await;
    assert_eq!(users_updated["count"], 2);

    // bob 开始输入，alice 收到输入指示
    send_event(
        &mut bob,
        json!({"event": "start_typing", "roomId": "sala", "userId": "bob"}),
    )
    .await;
    let typing = next_event(&mut alice, "user_start_typing").await;
    assert_eq!(typing["userId"], "bob");

    send_event(&mut bob, json!({"event": "stop_typing", "roomId": "sala"})).await;
    next_event(&mut alice, "user_stop_typing").await;

    // alice 通过 HTTP 发消息
    let response = client
        .post(format!("http://{}/api/v1/rooms/sala/messages", addr))
        .bearer_auth(app.token("alice", "Alice"))
        .json(&json!({"content": "oi"}))
        .send()
        .await
        .expect("post message");
    assert!(response.status().is_success());
    let message: serde_json::Value = response.json().await.expect("message json");
    assert_eq!(message["status"], "ACTIVE");

    // bob 不在查看：先收到未读通知（私有频道），再收到房间广播
    let unread = next_event(&mut bob, "unread_message").await;
    assert_eq!(unread["count"], 1);
    assert_eq!(unread["lastMessage"]["content"], "oi");
    next_event(&mut bob, "receive_message").await;
    next_event(&mut alice, "receive_message").await;

    // 离线成员 carol 有一条未读标记
    assert_eq!(app.unread.count_for("carol", "sala").await.unwrap(), 1);

    // bob 开始查看房间后，新消息不再产生未读通知
    send_event(
        &mut bob,
        json!({"event": "start_viewing_room", "roomId": "sala"}),
    )
    .await;
    sleep(Duration::from_millis(50)).await;

    let response = client
        .post(format!("http://{}/api/v1/rooms/sala/messages", addr))
        .bearer_auth(app.token("alice", "Alice"))
        .json(&json!({"content": "tudo bem?"}))
        .send()
        .await
        .expect("post message");
    assert!(response.status().is_success());

    // bob 收到的第一个事件必须直接是房间广播，而不是未读通知
    let event = next_any_event(&mut bob).await;
    assert_eq!(event["event"], "receive_message");
    assert_eq!(app.unread.count_for("bob", "sala").await.unwrap(), 1);

    // bob 标记已读：未读清零，事件发往 bob 的私有频道
    let response = client
        .post(format!("http://{}/api/v1/rooms/sala/read", addr))
        .bearer_auth(app.token("bob", "Bob"))
        .send()
        .await
        .expect("mark read");
    assert_eq!(response.status().as_u16(), 204);
    let read = next_event(&mut bob, "messages_read").await;
    assert_eq!(read["roomId"], "sala");
    assert_eq!(app.unread.count_for("bob", "sala").await.unwrap(), 0);

    // bob 断开：alice 收到离开事件，bob 从在线结构中被清掉
    bob.close(None).await.ok();
    let left = next_event(&mut alice, "user_left_room").await;
    assert_eq!(left["userId"], "bob");
    let users_updated = next_event(&mut alice, "room_users_updated").await;
    assert_eq!(users_updated["count"], 1);

    sleep(Duration::from_millis(50)).await;
    let users = app.presence.get_room_users("sala").await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].user_id, "alice");
    assert!(!app.presence.is_user_active_viewer("sala", "bob").await);
}

#[tokio::test]
async fn edit_and_delete_flow() {
    let app = TestApp::new().await;
    app.members.add_member("sala", "alice", "Alice").await;
    app.members.add_member("sala", "eve", "Eve").await;

    let addr = serve(app.router.clone()).await;
    let client = Client::new();

    let mut eve = connect_ws(addr, &app.token("eve", "Eve")).await;
    send_event(&mut eve, json!({"event": "join_room", "roomId": "sala"})).await;
    next_event(&mut eve, "room_users_updated").await;

    let message: serde_json::Value = client
        .post(format!("http://{}/api/v1/rooms/sala/messages", addr))
        .bearer_auth(app.token("alice", "Alice"))
        .json(&json!({"content": "original"}))
        .send()
        .await
        .expect("post")
        .json()
        .await
        .expect("json");
    let message_id = message["id"].as_str().unwrap().to_string();
    next_event(&mut eve, "receive_message").await;

    // 非作者编辑：403，房间里没有 message_updated 事件
    let response = client
        .patch(format!("http://{}/api/v1/messages/{}", addr, message_id))
        .bearer_auth(app.token("eve", "Eve"))
        .json(&json!({"content": "hacked"}))
        .send()
        .await
        .expect("patch");
    assert_eq!(response.status().as_u16(), 403);

    // 作者编辑成功，房间收到更新事件
    let response = client
        .patch(format!("http://{}/api/v1/messages/{}", addr, message_id))
        .bearer_auth(app.token("alice", "Alice"))
        .json(&json!({"content": "edited"}))
        .send()
        .await
        .expect("patch");
    assert!(response.status().is_success());
    let updated = next_event(&mut eve, "message_updated").await;
    assert_eq!(updated["content"], "edited");
    assert_eq!(updated["message"]["status"], "EDITED");

    // 删除：内容替换为墓碑，第二次删除 409
    let response = client
        .delete(format!("http://{}/api/v1/messages/{}", addr, message_id))
        .bearer_auth(app.token("alice", "Alice"))
        .send()
        .await
        .expect("delete");
    assert!(response.status().is_success());
    let deleted = next_event(&mut eve, "message_deleted").await;
    assert_eq!(deleted["message"]["status"], "DELETED");
    assert_eq!(deleted["message"]["content"], "Mensagem deletada");
    assert_eq!(deleted["message"]["attachments"].as_array().unwrap().len(), 0);

    let response = client
        .delete(format!("http://{}/api/v1/messages/{}", addr, message_id))
        .bearer_auth(app.token("alice", "Alice"))
        .send()
        .await
        .expect("delete again");
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn join_requires_membership_and_valid_token() {
    let app = TestApp::new().await;
    app.members.add_member("sala", "alice", "Alice").await;

    let addr = serve(app.router.clone()).await;

    // 无效令牌在升级阶段被拒绝
    let url = format!("ws://{}/ws?token=garbage", addr);
    assert!(tokio_tungstenite::connect_async(&url).await.is_err());

    // 非成员加入房间：错误确认，连接保持打开
    let mut mallory = connect_ws(addr, &app.token("mallory", "Mallory")).await;
    send_event(&mut mallory, json!({"event": "join_room", "roomId": "sala"})).await;
    let error = next_event(&mut mallory, "error").await;
    assert_eq!(error["code"], "JOIN_ROOM_FAILED");

    // 冒用他人 userId 的输入事件被拒绝
    send_event(
        &mut mallory,
        json!({"event": "start_typing", "roomId": "sala", "userId": "alice"}),
    )
    .await;
    let error = next_event(&mut mallory, "error").await;
    assert_eq!(error["code"], "FORBIDDEN");

    // 连接仍然可用
    send_event(&mut mallory, json!({"event": "stop_typing", "roomId": "sala"})).await;
    assert_eq!(app.presence.get_room_users("sala").await.len(), 0);
}
