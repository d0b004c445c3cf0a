mod common;

use std::sync::Arc;

use resortify_server::chat::{membership, reactions, resolver, stream};
use resortify_server::error::ChatError;
use resortify_server::models::AuthUser;
use resortify_shared::api::SendMessageRequest;
use resortify_shared::model::{ChatScope, MessageKind, ParticipantRole};

async fn auth_user(pool: &sqlx::SqlitePool, id: &str) -> AuthUser {
    let (name, email, role): (String, String, String) =
        sqlx::query_as(r#"SELECT name, email, role FROM "user" WHERE id = ?"#)
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap();
    AuthUser {
        id: id.to_string(),
        name,
        email,
        is_admin: role == "admin",
    }
}

#[tokio::test]
async fn concurrent_resolves_share_one_chat() {
    let pool = common::setup_test_db().await;
    let state = common::test_state(pool.clone(), Arc::new(common::RecordingNotifier::default()));
    let f = common::booking_fixture(&pool).await;
    let guest = auth_user(&pool, &f.guest_id).await;
    let owner = auth_user(&pool, &f.owner_id).await;
    let scope = ChatScope::booking(f.booking_id.clone());

    let (a, b) = tokio::join!(
        resolver::resolve(&state, &scope, &guest),
        resolver::resolve(&state, &scope, &owner),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(a.chat.id, b.chat.id);
    assert!(a.created ^ b.created, "exactly one caller creates the chat");

    let chats: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(chats, 1);

    let guidance: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE kind = 'system'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(guidance, 1);
}

#[tokio::test]
async fn find_or_create_recovers_from_lost_insert_race() {
    let pool = common::setup_test_db().await;
    let f = common::booking_fixture(&pool).await;
    let scope = ChatScope::booking(f.booking_id.clone());

    // Someone else wins the insert between our read and our write
    let winner = resolver::insert_chat(&pool, &scope, &f.owner_id).await.unwrap();

    let (chat, created) = resolver::find_or_create(&pool, &scope, &f.guest_id).await.unwrap();
    assert!(!created);
    assert_eq!(chat.id, winner.id);
    assert_eq!(chat.creator_id, f.owner_id);
}

#[tokio::test]
async fn duplicate_insert_is_a_conflict() {
    let pool = common::setup_test_db().await;
    let f = common::booking_fixture(&pool).await;
    let scope = ChatScope::booking(f.booking_id.clone());

    resolver::insert_chat(&pool, &scope, &f.guest_id).await.unwrap();
    let second = resolver::insert_chat(&pool, &scope, &f.owner_id).await;
    assert!(matches!(second, Err(ChatError::Conflict(_))));

    // Resort inquiries are unique per asker
    let resort = ChatScope::resort(f.resort_id.clone());
    resolver::insert_chat(&pool, &resort, &f.guest_id).await.unwrap();
    let again = resolver::insert_chat(&pool, &resort, &f.guest_id).await;
    assert!(matches!(again, Err(ChatError::Conflict(_))));
}

#[tokio::test]
async fn concurrent_find_or_create_from_both_sides() {
    let pool = common::setup_test_db().await;
    let f = common::booking_fixture(&pool).await;
    let scope = ChatScope::booking(f.booking_id.clone());

    let (a, b) = tokio::join!(
        resolver::find_or_create(&pool, &scope, &f.guest_id),
        resolver::find_or_create(&pool, &scope, &f.owner_id),
    );
    let (a, a_created) = a.unwrap();
    let (b, b_created) = b.unwrap();
    assert_eq!(a.id, b.id);
    assert!(a_created ^ b_created);
}

#[tokio::test]
async fn ensure_member_keeps_first_role_and_unhides() {
    let pool = common::setup_test_db().await;
    let f = common::booking_fixture(&pool).await;
    let chat = resolver::insert_chat(&pool, &ChatScope::booking(f.booking_id.clone()), &f.guest_id)
        .await
        .unwrap();

    let first = membership::ensure_member(&pool, &chat.id, &f.owner_id, ParticipantRole::Admin)
        .await
        .unwrap();
    assert_eq!(first.role, ParticipantRole::Admin);

    membership::hide_chat(&pool, &chat.id, &f.owner_id).await.unwrap();

    for _ in 0..3 {
        let again = membership::ensure_member(&pool, &chat.id, &f.owner_id, ParticipantRole::Owner)
            .await
            .unwrap();
        assert_eq!(again.role, ParticipantRole::Admin);
        assert!(!again.is_hidden());
    }

    let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_participants WHERE chat_id = ?")
        .bind(&chat.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn malformed_row_surfaces_as_error() {
    let pool = common::setup_test_db().await;
    let f = common::booking_fixture(&pool).await;
    let scope = ChatScope::booking(f.booking_id.clone());
    let chat = resolver::insert_chat(&pool, &scope, &f.guest_id).await.unwrap();

    sqlx::query("UPDATE chats SET status = 'archived' WHERE id = ?")
        .bind(&chat.id)
        .execute(&pool)
        .await
        .unwrap();

    let result = resolver::find(&pool, &scope, &f.guest_id).await;
    assert!(matches!(result, Err(ChatError::Malformed(_))));
}

#[tokio::test]
async fn duplicate_client_ref_insert_is_a_conflict() {
    let pool = common::setup_test_db().await;
    let f = common::booking_fixture(&pool).await;
    let chat = resolver::insert_chat(&pool, &ChatScope::booking(f.booking_id.clone()), &f.guest_id)
        .await
        .unwrap();

    let new = || stream::NewMessage {
        chat_id: &chat.id,
        sender_id: &f.guest_id,
        kind: MessageKind::User,
        content: "Arriving at noon",
        attachment: None,
        client_ref: Some("draft-7"),
    };
    stream::insert_message(&pool, new()).await.unwrap();
    let err = stream::insert_message(&pool, new()).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));
}

#[tokio::test]
async fn concurrent_retries_store_one_message() {
    let pool = common::setup_test_db().await;
    let state = common::test_state(pool.clone(), Arc::new(common::RecordingNotifier::default()));
    let f = common::booking_fixture(&pool).await;
    let guest = auth_user(&pool, &f.guest_id).await;
    let opened = resolver::resolve(&state, &ChatScope::booking(f.booking_id.clone()), &guest)
        .await
        .unwrap();

    let request = || SendMessageRequest {
        content: "Arriving at noon".into(),
        client_ref: Some("draft-7".into()),
        ..Default::default()
    };
    let (a, b) = tokio::join!(
        stream::send(&state, &opened.chat.id, &guest, request()),
        stream::send(&state, &opened.chat.id, &guest, request()),
    );
    assert_eq!(a.unwrap().id, b.unwrap().id);

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE client_ref = 'draft-7'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 1);
}

#[tokio::test]
async fn racing_reaction_toggles_announce_each_change_once() {
    let pool = common::setup_test_db().await;
    let state = common::test_state(pool.clone(), Arc::new(common::RecordingNotifier::default()));
    let f = common::booking_fixture(&pool).await;
    let guest = auth_user(&pool, &f.guest_id).await;
    let opened = resolver::resolve(&state, &ChatScope::booking(f.booking_id.clone()), &guest)
        .await
        .unwrap();
    let message = stream::send(
        &state,
        &opened.chat.id,
        &guest,
        SendMessageRequest {
            content: "Pool open late?".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    state.gateway.register(99, "watcher".into(), tx).await;
    state.gateway.subscribe_chat(99, &opened.chat.id).await;

    let (a, b) = tokio::join!(
        reactions::toggle(&state, &message.id, &f.guest_id, "👍"),
        reactions::toggle(&state, &message.id, &f.guest_id, "👍"),
    );
    a.unwrap();
    b.unwrap();

    let (mut added, mut removed) = (0i64, 0i64);
    while let Ok(raw) = rx.try_recv() {
        let event: serde_json::Value = serde_json::from_str(&raw).unwrap();
        match event["type"].as_str() {
            Some("reaction_added") => added += 1,
            Some("reaction_removed") => removed += 1,
            _ => {}
        }
    }
    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_reactions WHERE message_id = ?")
        .bind(&message.id)
        .fetch_one(&pool)
        .await
        .unwrap();

    assert!(added <= 1);
    assert_eq!(added - removed, stored);
}
