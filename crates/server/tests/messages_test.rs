mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use common::{auth_header, BookingFixture, RecordingNotifier};
use resortify_server::routes;

struct Ctx {
    server: TestServer,
    pool: sqlx::SqlitePool,
    notifier: Arc<RecordingNotifier>,
    f: BookingFixture,
    chat_id: String,
}

/// A booking chat both parties have already entered.
async fn setup() -> Ctx {
    let pool = common::setup_test_db().await;
    let (app, _state, notifier) = common::create_test_app(pool.clone());
    let server = TestServer::new(app).unwrap();
    let f = common::booking_fixture(&pool).await;

    let (h, v) = auth_header(&f.guest_token);
    let opened: Value = server
        .post(&format!("/api/chats/booking/{}", f.booking_id))
        .add_header(h, v)
        .await
        .json();
    let chat_id = opened["chat"]["id"].as_str().unwrap().to_string();

    let (h, v) = auth_header(&f.owner_token);
    server
        .post(&format!("/api/chats/booking/{}", f.booking_id))
        .add_header(h, v)
        .await
        .assert_status_ok();

    Ctx {
        server,
        pool,
        notifier,
        f,
        chat_id,
    }
}

async fn send(ctx: &Ctx, token: &str, body: Value) -> (StatusCode, Value) {
    let (h, v) = auth_header(token);
    let res = ctx
        .server
        .post(&format!("/api/chats/{}/messages", ctx.chat_id))
        .add_header(h, v)
        .json(&body)
        .await;
    (res.status_code(), res.json())
}

async fn list(ctx: &Ctx, token: &str, query: &str) -> Value {
    let (h, v) = auth_header(token);
    let res = ctx
        .server
        .get(&format!("/api/chats/{}/messages{}", ctx.chat_id, query))
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    res.json()
}

async fn wait_for_notices(notifier: &RecordingNotifier, n: usize) -> usize {
    for _ in 0..50 {
        let len = notifier.notices.lock().unwrap().len();
        if len >= n {
            return len;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    notifier.notices.lock().unwrap().len()
}

#[tokio::test]
async fn guest_message_is_unread_until_owner_marks_it() {
    let ctx = setup().await;

    let (status, msg) = send(&ctx, &ctx.f.guest_token, json!({ "content": "Hi, is this available?" })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["content"], "Hi, is this available?");
    assert_eq!(msg["kind"], "user");
    assert_eq!(msg["senderId"], ctx.f.guest_id.as_str());
    assert!(msg["readAt"].is_null());
    let msg_id = msg["id"].as_str().unwrap().to_string();

    let page = list(&ctx, &ctx.f.owner_token, "").await;
    let items = page["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["id"], msg_id.as_str());
    assert!(items[1]["readAt"].is_null());

    let (h, v) = auth_header(&ctx.f.owner_token);
    let res = ctx
        .server
        .post(&format!("/api/chats/{}/read", ctx.chat_id))
        .add_header(h, v)
        .json(&json!({ "messageIds": [msg_id] }))
        .await;
    res.assert_status_ok();
    let body: Value = res.json();
    assert_eq!(body["updated"], json!([msg_id]));

    let page = list(&ctx, &ctx.f.guest_token, "").await;
    assert!(page["items"][1]["readAt"].is_string());
}

#[tokio::test]
async fn mark_read_is_idempotent_and_skips_own_messages() {
    let ctx = setup().await;

    let (_, mine) = send(&ctx, &ctx.f.owner_token, json!({ "content": "Welcome!" })).await;
    let (_, theirs) = send(&ctx, &ctx.f.guest_token, json!({ "content": "Thanks" })).await;

    // Empty id list means everything unread
    let (h, v) = auth_header(&ctx.f.owner_token);
    let first: Value = ctx
        .server
        .post(&format!("/api/chats/{}/read", ctx.chat_id))
        .add_header(h, v)
        .json(&json!({}))
        .await
        .json();
    let updated = first["updated"].as_array().unwrap();
    assert!(updated.contains(&theirs["id"]));
    assert!(!updated.contains(&mine["id"]));

    let read_at: Option<String> = sqlx::query_scalar("SELECT read_at FROM chat_messages WHERE id = ?")
        .bind(theirs["id"].as_str().unwrap())
        .fetch_one(&ctx.pool)
        .await
        .unwrap();

    let (h, v) = auth_header(&ctx.f.owner_token);
    let second: Value = ctx
        .server
        .post(&format!("/api/chats/{}/read", ctx.chat_id))
        .add_header(h, v)
        .json(&json!({ "messageIds": [theirs["id"], mine["id"]] }))
        .await
        .json();
    assert_eq!(second["updated"], json!([]));

    let read_again: Option<String> = sqlx::query_scalar("SELECT read_at FROM chat_messages WHERE id = ?")
        .bind(theirs["id"].as_str().unwrap())
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(read_at, read_again);

    let own_read: Option<String> = sqlx::query_scalar("SELECT read_at FROM chat_messages WHERE id = ?")
        .bind(mine["id"].as_str().unwrap())
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert!(own_read.is_none());
}

#[tokio::test]
async fn blank_message_needs_attachment() {
    let ctx = setup().await;

    let (status, body) = send(&ctx, &ctx.f.guest_token, json!({ "content": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message content is required");

    let (status, msg) = send(
        &ctx,
        &ctx.f.guest_token,
        json!({
            "content": "",
            "attachment": {
                "url": "https://cdn.example.com/receipt.png",
                "contentType": "image/png",
                "filename": "receipt.png",
                "size": 2048
            }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(msg["attachment"]["filename"], "receipt.png");
    assert_eq!(msg["attachment"]["size"], 2048);
}

#[tokio::test]
async fn incomplete_attachment_is_rejected() {
    let ctx = setup().await;

    let (h, v) = auth_header(&ctx.f.guest_token);
    let res = ctx
        .server
        .post(&format!("/api/chats/{}/messages", ctx.chat_id))
        .add_header(h, v)
        .json(&json!({
            "content": "receipt",
            "attachment": { "url": "https://cdn.example.com/receipt.png" }
        }))
        .await;
    assert!(res.status_code().is_client_error());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE kind = 'user'")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn oversized_message_is_rejected() {
    let ctx = setup().await;
    let long = "a".repeat(resortify_shared::constants::MAX_MESSAGE_LENGTH + 1);
    let (status, _) = send(&ctx, &ctx.f.guest_token, json!({ "content": long })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn retried_send_with_same_client_ref_is_stored_once() {
    let ctx = setup().await;

    let body = json!({ "content": "Can we check in early?", "clientRef": "draft-1" });
    let (_, first) = send(&ctx, &ctx.f.guest_token, body.clone()).await;
    let (status, second) = send(&ctx, &ctx.f.guest_token, body).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["clientRef"], "draft-1");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE client_ref = 'draft-1'")
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn sender_deletes_own_message_and_content_is_gone() {
    let ctx = setup().await;
    let (_, msg) = send(&ctx, &ctx.f.guest_token, json!({ "content": "wrong chat, sorry" })).await;
    let msg_id = msg["id"].as_str().unwrap();

    // The owner cannot delete the guest's message
    let (h, v) = auth_header(&ctx.f.owner_token);
    ctx.server
        .delete(&format!("/api/messages/{}", msg_id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let (h, v) = auth_header(&ctx.f.guest_token);
    let res = ctx
        .server
        .delete(&format!("/api/messages/{}", msg_id))
        .add_header(h, v)
        .await;
    res.assert_status_ok();
    let deleted: Value = res.json();
    assert!(deleted["deletedAt"].is_string());
    assert_eq!(deleted["content"], "");

    // Still listed for both parties, without its content
    for token in [&ctx.f.guest_token, &ctx.f.owner_token] {
        let page = list(&ctx, token, "").await;
        let items = page["items"].as_array().unwrap();
        let tombstone = items.iter().find(|m| m["id"] == msg_id).unwrap();
        assert_eq!(tombstone["content"], "");
        assert_eq!(tombstone["senderId"], ctx.f.guest_id.as_str());
        assert!(tombstone["createdAt"].is_string());
    }

    // Deleting twice is harmless
    let (h, v) = auth_header(&ctx.f.guest_token);
    ctx.server
        .delete(&format!("/api/messages/{}", msg_id))
        .add_header(h, v)
        .await
        .assert_status_ok();

    // The stored row keeps its content for moderation
    let stored: String = sqlx::query_scalar("SELECT content FROM chat_messages WHERE id = ?")
        .bind(msg_id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(stored, "wrong chat, sorry");
}

#[tokio::test]
async fn admin_moderation_view_shows_deleted_content() {
    let ctx = setup().await;
    let (_, admin_token) = common::create_test_user(&ctx.pool, "mod@test.com", "Mod", "admin").await;
    let (h, v) = auth_header(&admin_token);
    ctx.server
        .get(&format!("/api/chats/{}", ctx.chat_id))
        .add_header(h, v)
        .await
        .assert_status_ok();

    let (_, msg) = send(&ctx, &ctx.f.guest_token, json!({ "content": "pay me outside the app" })).await;
    let (h, v) = auth_header(&ctx.f.guest_token);
    ctx.server
        .delete(&format!("/api/messages/{}", msg["id"].as_str().unwrap()))
        .add_header(h, v)
        .await
        .assert_status_ok();

    let page = list(&ctx, &admin_token, "?moderation=true").await;
    let found = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["id"] == msg["id"])
        .unwrap()
        .clone();
    assert_eq!(found["content"], "pay me outside the app");
    assert!(found["deletedAt"].is_string());

    let (h, v) = auth_header(&ctx.f.owner_token);
    ctx.server
        .get(&format!("/api/chats/{}/messages?moderation=true", ctx.chat_id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn system_message_cannot_be_deleted() {
    let ctx = setup().await;
    let page = list(&ctx, &ctx.f.guest_token, "").await;
    let guidance_id = page["items"][0]["id"].as_str().unwrap();

    let (h, v) = auth_header(&ctx.f.guest_token);
    ctx.server
        .delete(&format!("/api/messages/{}", guidance_id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn pages_walk_backwards_through_history() {
    let ctx = setup().await;

    for i in 0..5 {
        sqlx::query(
            "INSERT INTO chat_messages (id, chat_id, sender_id, kind, content, created_at) VALUES (?, ?, ?, 'user', ?, ?)",
        )
        .bind(format!("m{}", i))
        .bind(&ctx.chat_id)
        .bind(&ctx.f.guest_id)
        .bind(format!("message {}", i))
        .bind(format!("2030-01-01T00:00:0{}.000000Z", i))
        .execute(&ctx.pool)
        .await
        .unwrap();
    }

    let newest = list(&ctx, &ctx.f.owner_token, "?limit=2").await;
    let ids: Vec<&str> = newest["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["m3", "m4"]);
    assert_eq!(newest["hasMore"], true);

    let cursor = newest["cursor"].as_str().unwrap();
    let older = list(&ctx, &ctx.f.owner_token, &format!("?limit=2&before={}", cursor)).await;
    let ids: Vec<&str> = older["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[tokio::test]
async fn pages_keep_rows_that_share_a_timestamp() {
    let ctx = setup().await;

    for id in ["a", "b", "c"] {
        sqlx::query(
            "INSERT INTO chat_messages (id, chat_id, sender_id, kind, content, created_at) VALUES (?, ?, ?, 'user', ?, ?)",
        )
        .bind(id)
        .bind(&ctx.chat_id)
        .bind(&ctx.f.guest_id)
        .bind(format!("message {}", id))
        .bind("2030-01-01T00:00:00.000000Z")
        .execute(&ctx.pool)
        .await
        .unwrap();
    }

    let mut pages: Vec<Vec<String>> = Vec::new();
    let mut query = "?limit=2".to_string();
    loop {
        let page = list(&ctx, &ctx.f.owner_token, &query).await;
        pages.push(
            page["items"]
                .as_array()
                .unwrap()
                .iter()
                .map(|m| m["id"].as_str().unwrap().to_string())
                .collect(),
        );
        if page["hasMore"] != true {
            break;
        }
        query = format!("?limit=2&before={}", page["cursor"].as_str().unwrap());
    }

    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0], vec!["b", "c"]);
    // Older page: the payment guidance, then the remaining tied row
    assert_eq!(pages[1].len(), 2);
    assert_eq!(pages[1][1], "a");
}

#[tokio::test]
async fn malformed_cursor_is_rejected() {
    let ctx = setup().await;
    let (h, v) = auth_header(&ctx.f.owner_token);
    ctx.server
        .get(&format!("/api/chats/{}/messages?before=2030-01-01", ctx.chat_id))
        .add_header(h, v)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn guest_messages_notify_the_resort() {
    let ctx = setup().await;

    send(&ctx, &ctx.f.guest_token, json!({ "content": "Is breakfast included?" })).await;
    assert_eq!(wait_for_notices(&ctx.notifier, 1).await, 1);

    {
        let notices = ctx.notifier.notices.lock().unwrap();
        let notice = &notices[0];
        assert_eq!(notice.chat_id, ctx.chat_id);
        assert_eq!(notice.sender_user_id, ctx.f.guest_id);
        assert_eq!(notice.sender_name, "Gina Guest");
        assert_eq!(notice.content, "Is breakfast included?");
        assert_eq!(notice.recipient_address.as_deref(), Some("owner@test.com"));
    }

    send(&ctx, &ctx.f.owner_token, json!({ "content": "Yes it is" })).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.notifier.notices.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn notifier_failure_does_not_fail_send() {
    let pool = common::setup_test_db().await;
    let state = common::test_state(pool.clone(), Arc::new(common::FailingNotifier));
    let server = TestServer::new(routes::build_router(state)).unwrap();
    let f = common::booking_fixture(&pool).await;

    let (h, v) = auth_header(&f.guest_token);
    let opened: Value = server
        .post(&format!("/api/chats/booking/{}", f.booking_id))
        .add_header(h, v)
        .await
        .json();
    let chat_id = opened["chat"]["id"].as_str().unwrap();

    let (h, v) = auth_header(&f.guest_token);
    server
        .post(&format!("/api/chats/{}/messages", chat_id))
        .add_header(h, v)
        .json(&json!({ "content": "Hello" }))
        .await
        .assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn non_participant_cannot_send() {
    let ctx = setup().await;
    let (_, stranger) = common::create_test_user(&ctx.pool, "eve@test.com", "Eve", "guest").await;
    let (status, _) = send(&ctx, &stranger, json!({ "content": "hi" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
