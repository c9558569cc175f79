pub mod catalog;
pub mod identity;
pub mod lock;
pub mod notify;
pub mod payment;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Concurrent modification: {0}")]
    ConflictError(String),
    #[error("Upstream call timed out: {0}")]
    TimeoutError(String),
    #[error("Upstream service error: {0}")]
    UpstreamError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

pub use catalog::{ProductCatalog, ProductSnapshot};
pub use identity::{require_role, Authenticator, Identity, Role};
pub use lock::{InMemoryKeyedLock, KeyedLock, Lease};
pub use notify::{notify_quietly, LogNotifier, Notifier, RecordingNotifier};
pub use payment::{
    GatewayRefund, GatewayTransaction, GatewayVerification, InitializeTransaction, PaymentGateway,
    ProviderOutcome,
};
