use platter_core::CoreError;
use platter_shared::Money;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: String,
        to: String,
    },

    #[error("Order {0} is already paid")]
    AlreadyPaid(Uuid),

    #[error("No payment record for reference {0}")]
    PaymentRecordNotFound(String),

    #[error("Payment was not successful: {0}")]
    PaymentFailed(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Money,
        available: Money,
    },

    #[error("Amount {amount} is below the minimum withdrawal of {minimum}")]
    BelowMinimum {
        amount: Money,
        minimum: Money,
    },

    #[error("Another withdrawal for this vendor is being processed")]
    WalletBusy,

    #[error("A refund for order {0} is already being processed")]
    RefundInProgress(Uuid),

    #[error("Payment provider error: {0}")]
    UpstreamGateway(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl OrderError {
    pub fn transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        OrderError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrderError::UpstreamGateway(_)
                | OrderError::PaymentFailed(_)
                | OrderError::WalletBusy
                | OrderError::RefundInProgress(_)
                | OrderError::Conflict(_)
        )
    }
}

impl From<CoreError> for OrderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => OrderError::Validation(msg),
            CoreError::IdentityError(msg) => OrderError::NotAuthorized(msg),
            CoreError::ConflictError(msg) => OrderError::Conflict(msg),
            CoreError::TimeoutError(msg) | CoreError::UpstreamError(msg) => {
                OrderError::UpstreamGateway(msg)
            }
            CoreError::StorageError(msg) | CoreError::InternalError(msg) => OrderError::Storage(msg),
        }
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
