use axum::http::{HeaderName, Method};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use resortify_server::{chat, config::Config, db, notify, routes, AppState};

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resortify_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();

    let pool = match db::init_pool(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let notifier = notify::from_config(&config);
    let state = Arc::new(AppState::new(pool.clone(), config.clone(), notifier));

    let shutdown = CancellationToken::new();
    let sweeper = chat::ephemeral::spawn_typing_sweeper(state.clone(), shutdown.clone());

    let app = routes::build_router(state.clone()).layer(
        ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("cookie"),
                    HeaderName::from_static("authorization"),
                ])
                .allow_credentials(true),
        ),
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Resortify chat server running on {}", addr);

    let signal = shutdown.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
            signal.cancel();
        })
        .await;

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
    }

    shutdown.cancel();
    sweeper.await.ok();
    pool.close().await;
}
