//! Storage ports. `platter-store` provides Postgres implementations and
//! [`crate::memory::InMemoryStore`] implements all of them in process.

use async_trait::async_trait;
use platter_core::{CoreError, CoreResult};
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::{Cart, Order, Payment, VendorProfile, WithdrawalRequest};

/// Attempts made by [`update_order_with_retry`] before giving up on a contended order
const MAX_ORDER_WRITE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_cart(&self, customer_id: Uuid) -> CoreResult<Option<Cart>>;

    async fn save_cart(&self, cart: &Cart) -> CoreResult<()>;

    async fn clear_cart(&self, customer_id: Uuid) -> CoreResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists the order together with all its vendor sub-orders in one write
    async fn insert_order(&self, order: &Order) -> CoreResult<()>;

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    /// Replaces the stored document if its version still equals `order.version`.
    ///
    /// Returns the stored order with its bumped version, or
    /// [`CoreError::ConflictError`] when another writer got there first.
    async fn update_order(&self, order: &Order) -> CoreResult<Order>;

    async fn list_customer_orders(&self, customer_id: Uuid) -> CoreResult<Vec<Order>>;

    /// Every order holding a sub-order for `vendor_id`, oldest first
    async fn list_vendor_orders(&self, vendor_id: Uuid) -> CoreResult<Vec<Order>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Fails with [`CoreError::ConflictError`] if the order already has a payment record
    async fn insert_payment(&self, payment: &Payment) -> CoreResult<()>;

    async fn get_payment_for_order(&self, order_id: Uuid) -> CoreResult<Option<Payment>>;

    async fn find_payment_by_reference(&self, reference: &str) -> CoreResult<Option<Payment>>;

    /// Compare-and-set on `payment.version`. `Ok(false)` means the caller lost the race
    /// and nothing was written.
    async fn update_payment(&self, payment: &Payment) -> CoreResult<bool>;
}

#[async_trait]
pub trait VendorRepository: Send + Sync {
    async fn get_vendor(&self, id: Uuid) -> CoreResult<Option<VendorProfile>>;

    async fn list_withdrawals(&self, vendor_id: Uuid) -> CoreResult<Vec<WithdrawalRequest>>;

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> CoreResult<()>;

    async fn get_withdrawal(&self, id: Uuid) -> CoreResult<Option<WithdrawalRequest>>;

    async fn update_withdrawal(&self, request: &WithdrawalRequest) -> CoreResult<()>;
}

/// Loads, mutates and writes back an order, re-reading on version conflicts.
///
/// `mutate` runs against a fresh copy on every attempt, so it must be free of side effects.
pub async fn update_order_with_retry<F>(
    orders: &dyn OrderRepository,
    order_id: Uuid,
    mut mutate: F,
) -> OrderResult<Order>
where
    F: FnMut(&mut Order) -> OrderResult<()> + Send,
{
    for attempt in 1..=MAX_ORDER_WRITE_ATTEMPTS {
        let mut order = orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("order {}", order_id)))?;

        mutate(&mut order)?;

        match orders.update_order(&order).await {
            Ok(stored) => return Ok(stored),
            Err(CoreError::ConflictError(msg)) => {
                tracing::debug!("Order {} write conflict (attempt {}): {}", order_id, attempt, msg);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(OrderError::Conflict(format!(
        "order {} is being modified concurrently",
        order_id
    )))
}
