pub mod app_config;
pub mod database;
pub mod cart_repo;
pub mod catalog_repo;
pub mod order_repo;
pub mod payment_repo;
pub mod vendor_repo;
pub mod redis_repo;
pub mod events;
pub mod paystack;

pub use app_config::{Config, StorageBackend};
pub use database::DbClient;
pub use cart_repo::PgCartRepository;
pub use catalog_repo::PgProductCatalog;
pub use order_repo::PgOrderRepository;
pub use payment_repo::PgPaymentRepository;
pub use vendor_repo::PgVendorRepository;
pub use redis_repo::RedisLock;
pub use events::KafkaNotifier;
pub use paystack::{PaystackConfig, PaystackGateway};
