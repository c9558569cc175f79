use anyhow::Context;
use platter_api::middleware::auth::JwtAuthenticator;
use platter_api::{app, AppState, Backends};
use platter_core::{InMemoryKeyedLock, LogNotifier, PaymentGateway};
use platter_order::{InMemoryStore, MockGateway, PaymentSettings, WalletSettings};
use platter_store::app_config::GatewayProvider;
use platter_store::{
    Config, DbClient, KafkaNotifier, PaystackConfig, PaystackGateway, PgCartRepository,
    PgOrderRepository, PgPaymentRepository, PgProductCatalog, PgVendorRepository, RedisLock,
    StorageBackend,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "platter_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Platter API on port {}", config.server.port);

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.provider {
        GatewayProvider::Paystack => Arc::new(PaystackGateway::new(PaystackConfig {
            base_url: config.gateway.base_url.clone(),
            secret_key: config.gateway.secret_key.clone(),
        })),
        GatewayProvider::Mock => {
            tracing::warn!("Using the mock payment gateway; no real charges will be made");
            Arc::new(MockGateway::new())
        }
    };

    let backends = match config.storage.backend {
        StorageBackend::Postgres => postgres_backends(&config, gateway).await?,
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            Backends {
                carts: store.clone(),
                orders: store.clone(),
                payments: store.clone(),
                vendors: store.clone(),
                catalog: store,
                gateway,
                notifier: Arc::new(LogNotifier),
                lock: Arc::new(InMemoryKeyedLock::new()),
            }
        }
    };

    let payment_settings = PaymentSettings {
        currency: config.business_rules.currency.clone(),
        callback_url: config.gateway.callback_url.clone(),
        timeout: config.gateway.timeout(),
        refund_lock_ttl: config.gateway.timeout() * 3,
    };
    let wallet_settings = WalletSettings {
        minimum_withdrawal: config.business_rules.minimum_withdrawal,
        lock_ttl: Duration::from_secs(config.business_rules.withdrawal_lock_seconds),
    };

    let state = AppState::new(
        backends,
        Arc::new(JwtAuthenticator::new(&config.auth.jwt_secret)),
        payment_settings,
        wallet_settings,
    )
    .context("Failed to register metrics")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn postgres_backends(
    config: &Config,
    gateway: Arc<dyn PaymentGateway>,
) -> anyhow::Result<Backends> {
    let database = config
        .database
        .as_ref()
        .context("storage.backend = postgres requires a [database] section")?;
    let redis = config
        .redis
        .as_ref()
        .context("storage.backend = postgres requires a [redis] section")?;
    let kafka = config
        .kafka
        .as_ref()
        .context("storage.backend = postgres requires a [kafka] section")?;

    let db = DbClient::new(&database.url, database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let lock = RedisLock::new(&redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let notifier = KafkaNotifier::new(&kafka.brokers, &kafka.notification_topic)
        .context("Failed to create Kafka producer")?;

    Ok(Backends {
        carts: Arc::new(PgCartRepository::new(db.pool.clone())),
        orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
        payments: Arc::new(PgPaymentRepository::new(db.pool.clone())),
        vendors: Arc::new(PgVendorRepository::new(db.pool.clone())),
        catalog: Arc::new(PgProductCatalog::new(db.pool.clone())),
        gateway,
        notifier: Arc::new(notifier),
        lock: Arc::new(lock),
    })
}
