use chrono::Utc;
use platter_core::{notify_quietly, Identity, Notifier, Role};
use platter_shared::models::{NotificationEvent, NotificationKind, RecipientKind};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::{Order, OrderStatus, PaymentMethod, VendorOrderStatus};
use crate::repository::{update_order_with_retry, OrderRepository};

impl VendorOrderStatus {
    /// Position on the preparation path; `None` for Cancelled
    fn step(&self) -> Option<u8> {
        match self {
            VendorOrderStatus::Pending => Some(0),
            VendorOrderStatus::Confirmed => Some(1),
            VendorOrderStatus::Preparing => Some(2),
            VendorOrderStatus::Ready => Some(3),
            VendorOrderStatus::PickedUp => Some(4),
            VendorOrderStatus::Delivered => Some(5),
            VendorOrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VendorOrderStatus::Delivered | VendorOrderStatus::Cancelled)
    }

    /// Customer cancellation is still allowed
    pub fn is_cancellable(&self) -> bool {
        matches!(self, VendorOrderStatus::Pending | VendorOrderStatus::Confirmed)
    }

    /// Forward moves may skip steps; Cancelled only before preparation starts.
    pub fn can_transition_to(&self, next: VendorOrderStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        match (self.step(), next.step()) {
            (Some(from), Some(to)) => to > from,
            (_, None) => self.is_cancellable(),
            (None, _) => false,
        }
    }
}

/// Recomputes the customer-facing status from the vendor sub-orders.
///
/// Terminal aggregates are left alone and the result never ranks below `current`.
pub fn derive_order_status(current: OrderStatus, statuses: &[VendorOrderStatus]) -> OrderStatus {
    if current.is_terminal() || statuses.is_empty() {
        return current;
    }

    let all = |wanted: &[VendorOrderStatus]| statuses.iter().all(|s| wanted.contains(s));

    let derived = if all(&[VendorOrderStatus::Delivered]) {
        OrderStatus::Completed
    } else if all(&[VendorOrderStatus::Cancelled]) {
        OrderStatus::Cancelled
    } else if statuses.contains(&VendorOrderStatus::Cancelled) {
        OrderStatus::Processing
    } else if all(&[
        VendorOrderStatus::Confirmed,
        VendorOrderStatus::Preparing,
        VendorOrderStatus::Ready,
    ]) {
        OrderStatus::Processing
    } else {
        current
    };

    if derived.rank() < current.rank() {
        current
    } else {
        derived
    }
}

/// Drives sub-order status changes and the derived aggregate
pub struct FulfillmentService {
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
}

impl FulfillmentService {
    pub fn new(orders: Arc<dyn OrderRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { orders, notifier }
    }

    /// Moves `vendor_id`'s sub-order to `new_status` and re-derives the aggregate in the same write.
    #[instrument(skip(self))]
    pub async fn update_vendor_order_status(
        &self,
        order_id: Uuid,
        vendor_id: Uuid,
        new_status: VendorOrderStatus,
    ) -> OrderResult<Order> {
        let mut previous_aggregate = OrderStatus::Pending;

        let order = update_order_with_retry(self.orders.as_ref(), order_id, |order| {
            previous_aggregate = order.order_status;
            apply_vendor_status(order, vendor_id, new_status)
        })
        .await?;

        tracing::info!(
            "Order {} vendor {} -> {:?} (aggregate {:?} -> {:?})",
            order.id,
            vendor_id,
            new_status,
            previous_aggregate,
            order.order_status
        );

        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                order.customer_id,
                RecipientKind::Customer,
                NotificationKind::VendorOrderStatusChanged,
                serde_json::json!({
                    "order_id": order.id,
                    "vendor_id": vendor_id,
                    "status": new_status,
                    "order_status": order.order_status,
                }),
            ),
        )
        .await;

        Ok(order)
    }

    /// Customer-initiated cancellation of the whole order.
    ///
    /// `requested_status` must be Cancelled; every sub-order is cancelled with it.
    #[instrument(skip(self, identity), fields(caller = %identity.id))]
    pub async fn cancel_order(
        &self,
        identity: &Identity,
        order_id: Uuid,
        requested_status: OrderStatus,
    ) -> OrderResult<Order> {
        if requested_status != OrderStatus::Cancelled {
            return Err(OrderError::Validation(format!(
                "customers may only request CANCELLED, got {:?}",
                requested_status
            )));
        }

        let order = update_order_with_retry(self.orders.as_ref(), order_id, |order| {
            if order.customer_id != identity.id && !identity.is_admin() {
                return Err(OrderError::NotAuthorized(format!(
                    "order {} belongs to another customer",
                    order.id
                )));
            }
            if !matches!(order.order_status, OrderStatus::Pending | OrderStatus::Confirmed) {
                return Err(OrderError::transition(order.order_status, OrderStatus::Cancelled));
            }
            if let Some(vo) = order.vendor_orders.iter().find(|vo| !vo.status.is_cancellable()) {
                return Err(OrderError::transition(vo.status, VendorOrderStatus::Cancelled));
            }

            let now = Utc::now();
            for vo in order.vendor_orders.iter_mut() {
                vo.status = VendorOrderStatus::Cancelled;
                vo.updated_at = now;
            }
            order.order_status = OrderStatus::Cancelled;
            order.updated_at = now;
            Ok(())
        })
        .await?;

        tracing::info!("Order {} cancelled by {}", order.id, identity.id);

        let payload = serde_json::json!({ "order_id": order.id, "was_paid": order.is_paid });
        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                order.customer_id,
                RecipientKind::Customer,
                NotificationKind::OrderCancelled,
                payload.clone(),
            ),
        )
        .await;
        for vo in &order.vendor_orders {
            notify_quietly(
                self.notifier.as_ref(),
                NotificationEvent::new(
                    vo.vendor_id,
                    RecipientKind::Vendor,
                    NotificationKind::OrderCancelled,
                    payload.clone(),
                ),
            )
            .await;
        }

        Ok(order)
    }

    /// Visible to the owning customer, any vendor with a sub-order, and admins
    pub async fn get_order(&self, identity: &Identity, order_id: Uuid) -> OrderResult<Order> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("order {}", order_id)))?;

        let allowed = match identity.role {
            Role::Admin => true,
            Role::Customer => order.customer_id == identity.id,
            Role::Vendor => order.has_vendor(identity.id),
        };
        if !allowed {
            return Err(OrderError::NotAuthorized(format!(
                "order {} is not visible to {}",
                order_id, identity.id
            )));
        }
        Ok(order)
    }

    pub async fn list_customer_orders(&self, customer_id: Uuid) -> OrderResult<Vec<Order>> {
        Ok(self.orders.list_customer_orders(customer_id).await?)
    }

    pub async fn list_vendor_orders(&self, vendor_id: Uuid) -> OrderResult<Vec<Order>> {
        Ok(self.orders.list_vendor_orders(vendor_id).await?)
    }
}

fn apply_vendor_status(
    order: &mut Order,
    vendor_id: Uuid,
    new_status: VendorOrderStatus,
) -> OrderResult<()> {
    if order.order_status.is_terminal() {
        return Err(OrderError::transition(order.order_status, new_status));
    }

    let awaiting_payment = order.payment_method == PaymentMethod::Gateway && !order.is_paid;
    let order_id = order.id;
    let vendor_order = order.vendor_order_mut(vendor_id).ok_or_else(|| {
        OrderError::NotAuthorized(format!("vendor {} has no sub-order in {}", vendor_id, order_id))
    })?;

    if awaiting_payment && new_status != VendorOrderStatus::Cancelled {
        return Err(OrderError::InvalidTransition {
            from: "AwaitingPayment".into(),
            to: format!("{:?}", new_status),
        });
    }
    if !vendor_order.status.can_transition_to(new_status) {
        return Err(OrderError::transition(vendor_order.status, new_status));
    }

    let now = Utc::now();
    vendor_order.status = new_status;
    vendor_order.updated_at = now;

    let statuses: Vec<VendorOrderStatus> = order.vendor_orders.iter().map(|vo| vo.status).collect();
    order.order_status = derive_order_status(order.order_status, &statuses);

    if order.order_status == OrderStatus::Completed {
        order.is_delivered = true;
        order.delivered_at = Some(now);
        // Cash is collected on delivery
        if order.payment_method == PaymentMethod::CashOnDelivery && !order.is_paid {
            order.is_paid = true;
            order.paid_at = Some(now);
        }
    }
    order.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::testing::order_for;
    use platter_core::RecordingNotifier;

    use VendorOrderStatus::*;

    const ALL: [VendorOrderStatus; 7] =
        [Pending, Confirmed, Preparing, Ready, PickedUp, Delivered, Cancelled];

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: FulfillmentService,
        customer: Uuid,
        vendor_a: Uuid,
        vendor_b: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        Fixture {
            service: FulfillmentService::new(store.clone(), notifier.clone()),
            store,
            notifier,
            customer: Uuid::new_v4(),
            vendor_a: Uuid::new_v4(),
            vendor_b: Uuid::new_v4(),
        }
    }

    async fn place(f: &Fixture, method: PaymentMethod) -> Order {
        let order = order_for(f.customer, &[(f.vendor_a, 20), (f.vendor_b, 5)], method);
        f.store.insert_order(&order).await.unwrap();
        order
    }

    #[test]
    fn test_vendor_transitions() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Delivered));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Preparing.can_transition_to(Cancelled));
        assert!(!Ready.can_transition_to(Confirmed));
        assert!(!Preparing.can_transition_to(Preparing));
        for next in ALL {
            assert!(!Delivered.can_transition_to(next));
            assert!(!Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_completed_iff_every_sub_order_delivered() {
        for a in ALL {
            for b in ALL {
                for current in [OrderStatus::Pending, OrderStatus::Confirmed, OrderStatus::Processing] {
                    let derived = derive_order_status(current, &[a, b]);
                    let all_delivered = a == Delivered && b == Delivered;
                    assert_eq!(
                        derived == OrderStatus::Completed,
                        all_delivered,
                        "{:?}/{:?} from {:?} gave {:?}",
                        a,
                        b,
                        current,
                        derived
                    );
                    assert!(derived.rank() >= current.rank());
                }
            }
        }
    }

    #[test]
    fn test_partial_cancellation_keeps_order_processing() {
        assert_eq!(
            derive_order_status(OrderStatus::Pending, &[Cancelled, Preparing]),
            OrderStatus::Processing
        );
        assert_eq!(
            derive_order_status(OrderStatus::Pending, &[Cancelled, Cancelled]),
            OrderStatus::Cancelled
        );
        assert_eq!(
            derive_order_status(OrderStatus::Pending, &[Pending, Preparing]),
            OrderStatus::Pending
        );
        assert_eq!(
            derive_order_status(OrderStatus::Ready, &[Confirmed, Preparing]),
            OrderStatus::Ready
        );
    }

    #[tokio::test]
    async fn test_sibling_still_preparing_blocks_completion() {
        let f = fixture();
        let order = place(&f, PaymentMethod::CashOnDelivery).await;

        for status in [Confirmed, Preparing] {
            f.service.update_vendor_order_status(order.id, f.vendor_b, status).await.unwrap();
        }
        f.service.update_vendor_order_status(order.id, f.vendor_a, Confirmed).await.unwrap();
        let updated = f
            .service
            .update_vendor_order_status(order.id, f.vendor_a, Delivered)
            .await
            .unwrap();

        assert_eq!(updated.order_status, OrderStatus::Processing);
        assert!(!updated.is_delivered);

        let done = f
            .service
            .update_vendor_order_status(order.id, f.vendor_b, Delivered)
            .await
            .unwrap();
        assert_eq!(done.order_status, OrderStatus::Completed);
        assert!(done.is_delivered && done.delivered_at.is_some());
        // Cash collected on delivery
        assert!(done.is_paid);

        let late = f.service.update_vendor_order_status(order.id, f.vendor_b, Cancelled).await;
        assert!(matches!(late, Err(OrderError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_foreign_vendor_is_rejected() {
        let f = fixture();
        let order = place(&f, PaymentMethod::CashOnDelivery).await;

        let result = f
            .service
            .update_vendor_order_status(order.id, Uuid::new_v4(), Confirmed)
            .await;
        assert!(matches!(result, Err(OrderError::NotAuthorized(_))));

        let missing = f
            .service
            .update_vendor_order_status(Uuid::new_v4(), f.vendor_a, Confirmed)
            .await;
        assert!(matches!(missing, Err(OrderError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unpaid_gateway_order_only_allows_cancellation() {
        let f = fixture();
        let order = place(&f, PaymentMethod::Gateway).await;

        let result = f.service.update_vendor_order_status(order.id, f.vendor_a, Confirmed).await;
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));

        let cancelled = f
            .service
            .update_vendor_order_status(order.id, f.vendor_a, Cancelled)
            .await
            .unwrap();
        assert_eq!(cancelled.order_status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_cancel_allowed_before_preparation() {
        let f = fixture();
        let customer = Identity::new(f.customer, Role::Customer);

        for aggregate in [OrderStatus::Pending, OrderStatus::Confirmed] {
            let mut order = order_for(f.customer, &[(f.vendor_a, 20)], PaymentMethod::CashOnDelivery);
            order.order_status = aggregate;
            f.store.insert_order(&order).await.unwrap();

            let cancelled = f
                .service
                .cancel_order(&customer, order.id, OrderStatus::Cancelled)
                .await
                .unwrap();
            assert_eq!(cancelled.order_status, OrderStatus::Cancelled);
            assert!(cancelled.vendor_orders.iter().all(|vo| vo.status == Cancelled));
        }

        let vendor_alerts = f
            .notifier
            .sent()
            .iter()
            .filter(|e| e.kind == NotificationKind::OrderCancelled && e.recipient_id == f.vendor_a)
            .count();
        assert_eq!(vendor_alerts, 2);
    }

    #[tokio::test]
    async fn test_cancel_refused_once_underway() {
        let f = fixture();
        let customer = Identity::new(f.customer, Role::Customer);

        for aggregate in [OrderStatus::Processing, OrderStatus::Ready, OrderStatus::Completed] {
            let mut order = order_for(f.customer, &[(f.vendor_a, 20)], PaymentMethod::CashOnDelivery);
            order.order_status = aggregate;
            f.store.insert_order(&order).await.unwrap();

            let result = f.service.cancel_order(&customer, order.id, OrderStatus::Cancelled).await;
            assert!(matches!(result, Err(OrderError::InvalidTransition { .. })), "{:?}", aggregate);
        }

        // Aggregate still Pending but one vendor already cooking
        let order = place(&f, PaymentMethod::CashOnDelivery).await;
        f.service.update_vendor_order_status(order.id, f.vendor_a, Preparing).await.unwrap();
        let result = f.service.cancel_order(&customer, order.id, OrderStatus::Cancelled).await;
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_cancel_requires_owner() {
        let f = fixture();
        let order = place(&f, PaymentMethod::CashOnDelivery).await;
        let stranger = Identity::new(Uuid::new_v4(), Role::Customer);

        let result = f.service.cancel_order(&stranger, order.id, OrderStatus::Cancelled).await;
        assert!(matches!(result, Err(OrderError::NotAuthorized(_))));

        let wrong_status = f
            .service
            .cancel_order(&Identity::new(f.customer, Role::Customer), order.id, OrderStatus::Completed)
            .await;
        assert!(matches!(wrong_status, Err(OrderError::Validation(_))));

        let admin = Identity::new(Uuid::new_v4(), Role::Admin);
        assert!(f.service.cancel_order(&admin, order.id, OrderStatus::Cancelled).await.is_ok());
    }

    #[tokio::test]
    async fn test_order_visibility() {
        let f = fixture();
        let order = place(&f, PaymentMethod::CashOnDelivery).await;

        let owner = Identity::new(f.customer, Role::Customer);
        let vendor = Identity::new(f.vendor_b, Role::Vendor);
        let other_vendor = Identity::new(Uuid::new_v4(), Role::Vendor);

        assert!(f.service.get_order(&owner, order.id).await.is_ok());
        assert!(f.service.get_order(&vendor, order.id).await.is_ok());
        assert!(matches!(
            f.service.get_order(&other_vendor, order.id).await,
            Err(OrderError::NotAuthorized(_))
        ));
        assert_eq!(f.service.list_vendor_orders(f.vendor_a).await.unwrap().len(), 1);
        assert_eq!(f.service.list_customer_orders(f.customer).await.unwrap().len(), 1);
    }
}
