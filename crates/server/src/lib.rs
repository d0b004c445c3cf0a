pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;
pub mod ws;

use config::Config;
use notify::Notifier;
use std::sync::Arc;

/// Everything a request needs, built once at startup and shared by `Arc`.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub gateway: Arc<ws::gateway::GatewayState>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db,
            config,
            gateway: Arc::new(ws::gateway::GatewayState::new()),
            notifier,
        }
    }
}
