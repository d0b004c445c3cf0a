use std::env;
use std::time::Duration;

use resortify_shared::constants::TYPING_TTL_MS;

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Where guest messages are forwarded for email delivery. Unset means
    /// notices are only logged.
    pub notify_webhook_url: Option<String>,
    pub typing_ttl_ms: u64,
    pub typing_sweep_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3001,
            database_path: "./resortify-chat.db".into(),
            notify_webhook_url: None,
            typing_ttl_ms: TYPING_TTL_MS,
            typing_sweep_interval_ms: 1_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            typing_ttl_ms: env::var("TYPING_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.typing_ttl_ms),
            typing_sweep_interval_ms: env::var("TYPING_SWEEP_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.typing_sweep_interval_ms),
        }
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn typing_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.typing_sweep_interval_ms.max(50))
    }
}
