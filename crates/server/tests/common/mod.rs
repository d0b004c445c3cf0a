#![allow(dead_code)]

pub mod ws_helpers;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use resortify_server::{
    config::Config,
    db,
    notify::{NewMessageNotice, Notifier, NotifyError},
    routes, AppState,
};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::{Arc, Mutex};

/// Create an in-memory SQLite pool with schema applied.
pub async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory SQLite pool");

    db::apply_schema(&pool).await.unwrap();
    pool
}

/// Collects notices instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<NewMessageNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: NewMessageNotice) -> Result<(), NotifyError> {
        self.notices.lock().unwrap().push(notice);
        Ok(())
    }
}

/// Always fails, like an unreachable mail service.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notice: NewMessageNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(503))
    }
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        notify_webhook_url: None,
        typing_ttl_ms: 5_000,
        typing_sweep_interval_ms: 100,
    }
}

pub fn test_state(pool: SqlitePool, notifier: Arc<dyn Notifier>) -> Arc<AppState> {
    Arc::new(AppState::new(pool, test_config(), notifier))
}

/// Build a test Axum app with the given pool. Returns the notifier so tests
/// can inspect what was dispatched.
pub fn create_test_app(pool: SqlitePool) -> (Router, Arc<AppState>, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let state = test_state(pool, notifier.clone());
    (routes::build_router(state.clone()), state, notifier)
}

pub fn auth_header(token: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("authorization"),
        format!("Bearer {}", token).parse().unwrap(),
    )
}

/// Create a test user directly in the database. Returns (user_id, session_token).
pub async fn create_test_user(pool: &SqlitePool, email: &str, name: &str, role: &str) -> (String, String) {
    let user_id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(r#"INSERT INTO "user" (id, email, name, role, created_at) VALUES (?, ?, ?, ?, ?)"#)
        .bind(&user_id)
        .bind(email)
        .bind(name)
        .bind(role)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

    let token = uuid::Uuid::new_v4().to_string();
    let expires_at = resortify_shared::model::format_timestamp(chrono::Utc::now() + chrono::Duration::days(30));
    sqlx::query(r#"INSERT INTO "session" (token, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)"#)
        .bind(&token)
        .bind(&user_id)
        .bind(&expires_at)
        .bind(&now)
        .execute(pool)
        .await
        .unwrap();

    (user_id, token)
}

pub async fn create_resort(pool: &SqlitePool, owner_id: &str, name: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query("INSERT INTO resorts (id, owner_id, name, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id).bind(owner_id).bind(name).bind(&now)
        .execute(pool).await.unwrap();
    id
}

pub async fn create_booking(pool: &SqlitePool, resort_id: &str, guest_id: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query("INSERT INTO bookings (id, resort_id, guest_id, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id).bind(resort_id).bind(guest_id).bind(&now)
        .execute(pool).await.unwrap();
    id
}

pub struct BookingFixture {
    pub guest_id: String,
    pub guest_token: String,
    pub owner_id: String,
    pub owner_token: String,
    pub resort_id: String,
    pub booking_id: String,
}

/// A guest, a resort owner, their resort, and one booking between them.
pub async fn booking_fixture(pool: &SqlitePool) -> BookingFixture {
    let (guest_id, guest_token) = create_test_user(pool, "guest@test.com", "Gina Guest", "guest").await;
    let (owner_id, owner_token) = create_test_user(pool, "owner@test.com", "Oscar Owner", "owner").await;
    let resort_id = create_resort(pool, &owner_id, "Coral Cove").await;
    let booking_id = create_booking(pool, &resort_id, &guest_id).await;
    BookingFixture {
        guest_id,
        guest_token,
        owner_id,
        owner_token,
        resort_id,
        booking_id,
    }
}
