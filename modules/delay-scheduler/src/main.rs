use delay_scheduler::{health::health, Config, LevelPoller};
use axum::{routing::get, Router};
use message_log::{InMemoryLog, JetStreamLog, MessageLog};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting delay scheduler...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        bus_type = %config.bus_type,
        levels = config.levels.len(),
        tick_ms = config.tick.as_millis() as u64,
        "Configuration loaded"
    );

    let log: Arc<dyn MessageLog> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using InMemory message log");
            Arc::new(InMemoryLog::new())
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = async_nats::connect(&config.nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(JetStreamLog::new(client))
        }
        other => panic!("Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'", other),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut pollers = Vec::new();
    for level in config.levels.clone() {
        tracing::info!(level = %level.name, mode = ?level.mode, "starting level poller");
        let poller = LevelPoller::new(log.clone(), level, config.tick);
        pollers.push(poller.spawn(shutdown_rx.clone()));
    }

    let app = Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Delay scheduler listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
        })
        .await
        .expect("Server failed to start");

    tracing::info!("Shutting down level pollers");
    let _ = shutdown_tx.send(true);
    for poller in pollers {
        let _ = poller.await;
    }
}
