use message_log::harness::{ConsumerHarness, RetryLadder};
use message_log::{InMemoryLog, JetStreamLog, MessageLog};
use order_service::adapters::{
    HttpFraudService, HttpInventoryService, HttpPricingService, HttpShippingService,
    InMemorySeckillGate, LogNotificationProducer, LogTimeoutScheduler, PgOrderRepository,
    RedisSeckillGate, ServiceClient,
};
use order_service::domain::{InMemoryOrderRepository, OrderRepository};
use order_service::ports::{InventoryService, SeckillGate};
use order_service::routes::{router, AppState};
use order_service::saga::{Deps, Orchestrator};
use order_service::{Config, OrderCreationHandler, TimeoutReaperHandler};
use sqlx::postgres::PgPoolOptions;
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

    tracing::info!("Starting order service...");

    let config = Arc::new(Config::from_env().expect("Failed to load configuration from environment"));

    tracing::info!(
        bus_type = %config.bus_type,
        repository = %config.repository,
        seckill_store = %config.seckill_store,
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

    let repo: Arc<dyn OrderRepository> = match config.repository.as_str() {
        "inmemory" => Arc::new(InMemoryOrderRepository::new()),
        "postgres" => {
            let database_url = config.database_url.as_deref().expect("DATABASE_URL is set");
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            sqlx::migrate!("./db/migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            Arc::new(PgOrderRepository::new(pool))
        }
        other => panic!(
            "Invalid ORDER_REPOSITORY: {}. Must be 'inmemory' or 'postgres'",
            other
        ),
    };

    let gate: Arc<dyn SeckillGate> = match config.seckill_store.as_str() {
        "inmemory" => Arc::new(InMemorySeckillGate::new()),
        "redis" => {
            tracing::info!("Connecting to Redis at {}", config.redis_url);
            Arc::new(
                RedisSeckillGate::connect(&config.redis_url)
                    .await
                    .expect("Failed to connect to Redis"),
            )
        }
        other => panic!(
            "Invalid SECKILL_STORE: {}. Must be 'inmemory' or 'redis'",
            other
        ),
    };

    let client = ServiceClient::new(config.rpc_timeout).expect("Failed to build HTTP client");
    let inventory: Arc<dyn InventoryService> = Arc::new(HttpInventoryService::new(
        client.clone(),
        config.inventory_reserve_url.clone(),
        config.inventory_release_url.clone(),
    ));

    let deps = Arc::new(Deps {
        repo: repo.clone(),
        fraud: Arc::new(HttpFraudService::new(client.clone(), config.fraud_url.clone())),
        gate: gate.clone(),
        inventory: inventory.clone(),
        pricing: Arc::new(HttpPricingService::new(
            client.clone(),
            config.pricing_url.clone(),
            config.promotion_url.clone(),
        )),
        shipping: Arc::new(HttpShippingService::new(
            client.clone(),
            config.shipping_url.clone(),
        )),
        scheduler: Arc::new(LogTimeoutScheduler::new(
            log.clone(),
            config.delay_topic.clone(),
            config.timeout_topic.clone(),
        )),
        notifier: Arc::new(LogNotificationProducer::new(
            log.clone(),
            config.notification_topic.clone(),
            config.payment_timeout,
        )),
    });

    let orchestrator = Arc::new(Orchestrator::new(deps, config.processing_deadline));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut consumers = Vec::new();

    let creation_harness = ConsumerHarness::new(
        log.clone(),
        RetryLadder::from_secs(&config.order_topic, &config.retry_ladder),
        config.consumer_group.clone(),
        Arc::new(OrderCreationHandler::new(orchestrator)),
    );
    consumers.extend(creation_harness.spawn_all(shutdown_rx.clone()));

    let reaper_harness = ConsumerHarness::new(
        log.clone(),
        RetryLadder::from_secs(&config.timeout_topic, &config.retry_ladder),
        format!("{}-reaper", config.consumer_group),
        Arc::new(TimeoutReaperHandler::new(repo.clone(), inventory)),
    );
    consumers.extend(reaper_harness.spawn_all(shutdown_rx));

    let state = AppState {
        log: log.clone(),
        gate,
        config: config.clone(),
    };
    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Order service listening on {}", addr);

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

    tracing::info!("Shutting down consumers");
    let _ = shutdown_tx.send(true);
    for consumer in consumers {
        let _ = consumer.await;
    }
}
