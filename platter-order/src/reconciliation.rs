//! Payment initialization, provider verification and refunds.
//!
//! The Pending -> Completed move on a [`Payment`] is a compare-and-set in the
//! repository. Only the caller that wins it marks the order paid, clears the
//! cart and sends notifications, so a webhook racing a client poll settles once.
//! Refunds on one order are serialized through a [`Lease`] on the order.

use chrono::Utc;
use platter_core::{
    notify_quietly, CoreResult, GatewayVerification, InitializeTransaction, KeyedLock, Lease,
    Notifier, PaymentGateway, ProviderOutcome,
};
use platter_shared::models::{NotificationEvent, NotificationKind, RecipientKind};
use platter_shared::{Masked, Money};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::decomposer::notify_vendors_of_new_order;
use crate::error::{OrderError, OrderResult};
use crate::models::{
    Order, OrderStatus, Payment, PaymentMethod, PaymentResult, PaymentStatus, RefundStatus,
};
use crate::repository::{update_order_with_retry, CartRepository, OrderRepository, PaymentRepository};

const MAX_REFUND_RECORD_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub callback_url: Option<String>,
    /// Upper bound on any single provider call
    pub timeout: Duration,
    /// Lease on the per-order refund lock; must outlive a provider call
    pub refund_lock_ttl: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            callback_url: None,
            timeout: Duration::from_secs(10),
            refund_lock_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InitializedPayment {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPayment {
    pub order: Order,
    pub payment: Payment,
}

pub struct PaymentReconciler {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentRepository>,
    carts: Arc<dyn CartRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    lock: Arc<dyn KeyedLock>,
    settings: PaymentSettings,
}

impl PaymentReconciler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentRepository>,
        carts: Arc<dyn CartRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        lock: Arc<dyn KeyedLock>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders,
            payments,
            carts,
            gateway,
            notifier,
            lock,
            settings,
        }
    }

    /// Opens a provider transaction for the order's total.
    ///
    /// A retry after a failed or abandoned attempt reuses the order's payment
    /// record with the new reference. A still-pending reference is first
    /// checked with the provider, and settles the order instead if it was paid.
    #[instrument(skip(self, email), fields(email = %Masked(email)))]
    pub async fn initialize_payment(
        &self,
        customer_id: Uuid,
        order_id: Uuid,
        email: &str,
    ) -> OrderResult<InitializedPayment> {
        let order = self.load_order(order_id).await?;
        if order.customer_id != customer_id {
            return Err(OrderError::NotAuthorized(format!(
                "order {} belongs to another customer",
                order_id
            )));
        }
        if order.is_paid {
            return Err(OrderError::AlreadyPaid(order_id));
        }
        if order.payment_method == PaymentMethod::CashOnDelivery {
            return Err(OrderError::Validation(
                "cash on delivery orders are paid on delivery".into(),
            ));
        }
        if order.order_status.is_terminal() {
            return Err(OrderError::transition(order.order_status, PaymentStatus::Pending));
        }

        let existing = self.payments.get_payment_for_order(order_id).await?;
        if let Some(payment) = &existing {
            match payment.status {
                PaymentStatus::Completed | PaymentStatus::Refunded => {
                    return Err(OrderError::AlreadyPaid(order_id));
                }
                PaymentStatus::Pending => {
                    if self.settle_if_captured(payment).await? {
                        return Err(OrderError::AlreadyPaid(order_id));
                    }
                }
                PaymentStatus::Failed => {}
            }
        }

        let request = InitializeTransaction {
            email: email.to_string(),
            amount: order.price.total_price,
            currency: self.settings.currency.clone(),
            order_id,
            callback_url: self.settings.callback_url.clone(),
            metadata: serde_json::json!({
                "order_id": order_id,
                "customer_id": customer_id,
            }),
        };
        let transaction = self
            .bounded("initialize", self.gateway.initialize_transaction(&request))
            .await?;

        let now = Utc::now();
        let payment = match existing {
            Some(mut payment) => {
                payment.adopt_reference(&transaction.reference);
                payment.status = PaymentStatus::Pending;
                payment.amount = order.price.total_price;
                payment.currency = self.settings.currency.clone();
                payment.authorization_url = Some(transaction.authorization_url.clone());
                payment.failure_reason = None;
                payment.payment_details = serde_json::Value::Null;
                payment.updated_at = now;
                if !self.payments.update_payment(&payment).await? {
                    return Err(OrderError::Conflict(format!(
                        "payment for order {} changed during initialization",
                        order_id
                    )));
                }
                payment.version += 1;
                payment
            }
            None => {
                let payment = Payment {
                    id: Uuid::new_v4(),
                    customer_id,
                    order_id,
                    method: order.payment_method,
                    amount: order.price.total_price,
                    currency: self.settings.currency.clone(),
                    status: PaymentStatus::Pending,
                    transaction_id: transaction.reference.clone(),
                    previous_references: Vec::new(),
                    authorization_url: Some(transaction.authorization_url.clone()),
                    payment_details: serde_json::Value::Null,
                    failure_reason: None,
                    refund_amount: Money::ZERO,
                    refund_status: RefundStatus::None,
                    refunded_at: None,
                    paid_at: None,
                    version: 0,
                    created_at: now,
                    updated_at: now,
                };
                self.payments.insert_payment(&payment).await?;
                payment
            }
        };

        tracing::info!(
            "Initialized {} payment {} for order {} ({} {})",
            self.gateway.name(),
            payment.transaction_id,
            order_id,
            payment.amount,
            payment.currency
        );

        Ok(InitializedPayment {
            authorization_url: transaction.authorization_url,
            access_code: transaction.access_code,
            reference: transaction.reference,
            payment,
        })
    }

    /// Client-triggered verification; `reference` must belong to `order_id`.
    #[instrument(skip(self))]
    pub async fn verify_payment(&self, order_id: Uuid, reference: &str) -> OrderResult<VerifiedPayment> {
        let payment = self
            .payments
            .find_payment_by_reference(reference)
            .await?
            .filter(|p| p.order_id == order_id)
            .ok_or_else(|| OrderError::PaymentRecordNotFound(reference.to_string()))?;
        self.settle(payment, reference).await
    }

    /// Provider webhook entry point. The event's own status is ignored; the
    /// provider is asked again.
    #[instrument(skip(self))]
    pub async fn verify_by_reference(&self, reference: &str) -> OrderResult<VerifiedPayment> {
        let payment = self
            .payments
            .find_payment_by_reference(reference)
            .await?
            .ok_or_else(|| OrderError::PaymentRecordNotFound(reference.to_string()))?;
        self.settle(payment, reference).await
    }

    /// Refunds `amount` (or everything still refundable) of a completed payment.
    ///
    /// Holds the order's refund lock from the refundable check until the
    /// refund is recorded; a concurrent request gets `RefundInProgress`.
    #[instrument(skip(self))]
    pub async fn refund_transaction(
        &self,
        order_id: Uuid,
        amount: Option<Money>,
    ) -> OrderResult<Payment> {
        let lease = Lease::acquire(self.lock.clone(), refund_key(order_id), self.settings.refund_lock_ttl)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Refund for order {} already in progress", order_id);
                OrderError::RefundInProgress(order_id)
            })?;
        let result = self.refund_locked(order_id, amount).await;
        lease.release().await;
        let (payment, refunded) = result?;

        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                payment.customer_id,
                RecipientKind::Customer,
                NotificationKind::RefundProcessed,
                serde_json::json!({
                    "order_id": order_id,
                    "amount": refunded,
                    "refund_status": payment.refund_status,
                }),
            ),
        )
        .await;

        Ok(payment)
    }

    async fn refund_locked(&self, order_id: Uuid, amount: Option<Money>) -> OrderResult<(Payment, Money)> {
        let payment = self
            .payments
            .get_payment_for_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("payment for order {}", order_id)))?;
        if payment.status != PaymentStatus::Completed {
            return Err(OrderError::transition(payment.status, PaymentStatus::Refunded));
        }

        let amount = amount.unwrap_or_else(|| payment.remaining_refundable());
        check_refund_amount(&payment, amount)?;

        let receipt = self
            .bounded(
                "refund",
                self.gateway.refund_transaction(&payment.transaction_id, amount),
            )
            .await?;

        let payment = self.record_refund(payment.id, order_id, amount).await?;

        if payment.refund_status == RefundStatus::Full {
            update_order_with_retry(self.orders.as_ref(), order_id, |order| {
                order.order_status = OrderStatus::Refunded;
                order.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        }

        tracing::info!(
            "Refunded {} on order {} ({:?}, provider status {})",
            amount,
            order_id,
            payment.refund_status,
            receipt.provider_status
        );
        Ok((payment, amount))
    }

    async fn record_refund(&self, payment_id: Uuid, order_id: Uuid, amount: Money) -> OrderResult<Payment> {
        for attempt in 1..=MAX_REFUND_RECORD_ATTEMPTS {
            let mut payment = self
                .payments
                .get_payment_for_order(order_id)
                .await?
                .filter(|p| p.id == payment_id)
                .ok_or_else(|| OrderError::NotFound(format!("payment {}", payment_id)))?;
            if payment.status != PaymentStatus::Completed {
                return Err(OrderError::transition(payment.status, PaymentStatus::Refunded));
            }
            check_refund_amount(&payment, amount)?;

            let now = Utc::now();
            payment.refund_amount += amount;
            payment.refunded_at = Some(now);
            payment.updated_at = now;
            if payment.refund_amount == payment.amount {
                payment.status = PaymentStatus::Refunded;
                payment.refund_status = RefundStatus::Full;
            } else {
                payment.refund_status = RefundStatus::Partial;
            }

            if self.payments.update_payment(&payment).await? {
                payment.version += 1;
                return Ok(payment);
            }
            tracing::debug!("Refund record for payment {} lost a race (attempt {})", payment_id, attempt);
        }

        tracing::error!(
            "Provider refunded {} on payment {} but the record could not be updated",
            amount,
            payment_id
        );
        Err(OrderError::Conflict(format!("payment {} is being modified concurrently", payment_id)))
    }

    /// Asks the provider about a pending payment's current reference before it
    /// is replaced. Returns `true` when that reference was paid and is now settled.
    async fn settle_if_captured(&self, payment: &Payment) -> OrderResult<bool> {
        let verification = self
            .bounded("verify", self.gateway.verify_transaction(&payment.transaction_id))
            .await?;
        if verification.outcome != ProviderOutcome::Succeeded || amount_mismatch(payment, &verification).is_some() {
            return Ok(false);
        }

        tracing::info!(
            "Pending payment {} was paid before re-initialization; settling it",
            payment.transaction_id
        );
        let reference = payment.transaction_id.clone();
        self.mark_completed(payment.clone(), &reference, verification).await?;
        Ok(true)
    }

    /// Verifies `reference` with the provider and applies the outcome.
    ///
    /// A superseded reference can only settle the payment; its failure leaves
    /// the current attempt alone.
    async fn settle(&self, payment: Payment, reference: &str) -> OrderResult<VerifiedPayment> {
        let superseded = payment.transaction_id != reference;
        match payment.status {
            PaymentStatus::Completed | PaymentStatus::Refunded => self.already_settled(payment).await,
            PaymentStatus::Failed if !superseded => Err(OrderError::PaymentFailed(
                payment
                    .failure_reason
                    .unwrap_or_else(|| "payment was declined".to_string()),
            )),
            PaymentStatus::Failed | PaymentStatus::Pending => {
                let verification = self
                    .bounded("verify", self.gateway.verify_transaction(reference))
                    .await?;
                match verification.outcome {
                    ProviderOutcome::Pending => {
                        tracing::warn!(
                            "Provider reports {} for {}; leaving payment pending",
                            verification.provider_status,
                            reference
                        );
                        Err(OrderError::UpstreamGateway(format!(
                            "payment {} is still {}",
                            reference, verification.provider_status
                        )))
                    }
                    ProviderOutcome::Succeeded => match amount_mismatch(&payment, &verification) {
                        Some(reason) if superseded => Err(OrderError::PaymentFailed(reason)),
                        Some(reason) => self.mark_failed(payment, verification, reason).await,
                        None => self.mark_completed(payment, reference, verification).await,
                    },
                    ProviderOutcome::Failed => {
                        let reason = format!("provider status {}", verification.provider_status);
                        if superseded {
                            return Err(OrderError::PaymentFailed(reason));
                        }
                        self.mark_failed(payment, verification, reason).await
                    }
                }
            }
        }
    }

    async fn mark_completed(
        &self,
        mut payment: Payment,
        reference: &str,
        verification: GatewayVerification,
    ) -> OrderResult<VerifiedPayment> {
        let now = Utc::now();
        payment.adopt_reference(reference);
        payment.status = PaymentStatus::Completed;
        payment.paid_at = Some(now);
        payment.failure_reason = None;
        payment.payment_details = verification.payload;
        payment.updated_at = now;

        if !self.payments.update_payment(&payment).await? {
            tracing::debug!("Payment {} settled by a concurrent verification", payment.transaction_id);
            let current = self.reload(&payment).await?;
            return match current.status {
                PaymentStatus::Completed | PaymentStatus::Refunded => self.already_settled(current).await,
                _ => Err(OrderError::Conflict(format!(
                    "payment {} changed during verification",
                    current.transaction_id
                ))),
            };
        }
        payment.version += 1;

        let result = PaymentResult {
            reference: payment.transaction_id.clone(),
            provider_status: verification.provider_status,
            paid_at: now,
        };
        let order = update_order_with_retry(self.orders.as_ref(), payment.order_id, |order| {
            mark_order_paid(order, result.clone());
            Ok(())
        })
        .await?;

        tracing::info!("Payment {} confirmed for order {}", payment.transaction_id, order.id);
        self.after_settlement(order, payment).await
    }

    /// Side effects of a payment becoming Completed, run once per order.
    ///
    /// A cancelled order is not fulfilled; its captured amount is refunded.
    async fn after_settlement(&self, order: Order, payment: Payment) -> OrderResult<VerifiedPayment> {
        if order.order_status == OrderStatus::Cancelled {
            return self.refund_cancelled(order, payment).await;
        }
        if order.order_status.is_terminal() {
            return Ok(VerifiedPayment { order, payment });
        }

        if let Err(e) = self.carts.clear_cart(order.customer_id).await {
            tracing::error!("Failed to clear cart after payment for order {}: {}", order.id, e);
        }
        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                order.customer_id,
                RecipientKind::Customer,
                NotificationKind::PaymentConfirmed,
                serde_json::json!({
                    "order_id": order.id,
                    "reference": payment.transaction_id,
                    "amount": payment.amount,
                }),
            ),
        )
        .await;
        notify_vendors_of_new_order(self.notifier.as_ref(), &order).await;

        Ok(VerifiedPayment { order, payment })
    }

    async fn refund_cancelled(&self, order: Order, payment: Payment) -> OrderResult<VerifiedPayment> {
        tracing::warn!(
            "Payment {} captured for cancelled order {}; refunding",
            payment.transaction_id,
            order.id
        );
        match self.refund_transaction(order.id, None).await {
            Ok(payment) => {
                let order = self.load_order(order.id).await?;
                Ok(VerifiedPayment { order, payment })
            }
            Err(e) => {
                tracing::error!(
                    "Refund of {} for cancelled order {} failed: {}",
                    payment.amount,
                    order.id,
                    e
                );
                Err(e)
            }
        }
    }

    async fn mark_failed(
        &self,
        mut payment: Payment,
        verification: GatewayVerification,
        reason: String,
    ) -> OrderResult<VerifiedPayment> {
        tracing::warn!("Payment {} failed: {}", payment.transaction_id, reason);

        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason.clone());
        payment.payment_details = verification.payload;
        payment.updated_at = Utc::now();

        if self.payments.update_payment(&payment).await? {
            notify_quietly(
                self.notifier.as_ref(),
                NotificationEvent::new(
                    payment.customer_id,
                    RecipientKind::Customer,
                    NotificationKind::PaymentFailed,
                    serde_json::json!({ "order_id": payment.order_id, "reason": reason }),
                ),
            )
            .await;
            return Err(OrderError::PaymentFailed(reason));
        }

        let current = self.reload(&payment).await?;
        match current.status {
            PaymentStatus::Completed | PaymentStatus::Refunded => self.already_settled(current).await,
            _ => Err(OrderError::PaymentFailed(reason)),
        }
    }

    /// No side effects, except finishing a settlement that was interrupted:
    /// an order left unpaid, or a cancelled order whose capture was not refunded.
    async fn already_settled(&self, payment: Payment) -> OrderResult<VerifiedPayment> {
        let order = self.load_order(payment.order_id).await?;
        if order.is_paid {
            if order.order_status == OrderStatus::Cancelled && payment.status == PaymentStatus::Completed {
                return self.refund_cancelled(order, payment).await;
            }
            return Ok(VerifiedPayment { order, payment });
        }

        tracing::warn!(
            "Order {} unpaid although payment {} is settled; repairing",
            order.id,
            payment.transaction_id
        );
        let result = PaymentResult {
            reference: payment.transaction_id.clone(),
            provider_status: "success".to_string(),
            paid_at: payment.paid_at.unwrap_or_else(Utc::now),
        };
        let order = update_order_with_retry(self.orders.as_ref(), order.id, |order| {
            mark_order_paid(order, result.clone());
            Ok(())
        })
        .await?;
        if payment.status == PaymentStatus::Refunded {
            return Ok(VerifiedPayment { order, payment });
        }
        self.after_settlement(order, payment).await
    }

    async fn reload(&self, payment: &Payment) -> OrderResult<Payment> {
        self.payments
            .get_payment_for_order(payment.order_id)
            .await?
            .ok_or_else(|| OrderError::PaymentRecordNotFound(payment.transaction_id.clone()))
    }

    async fn load_order(&self, order_id: Uuid) -> OrderResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("order {}", order_id)))
    }

    async fn bounded<T, F>(&self, call: &str, fut: F) -> OrderResult<T>
    where
        F: Future<Output = CoreResult<T>>,
    {
        match tokio::time::timeout(self.settings.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!("{} {} call failed: {}", self.gateway.name(), call, e);
                Err(OrderError::UpstreamGateway(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    "{} {} call timed out after {:?}",
                    self.gateway.name(),
                    call,
                    self.settings.timeout
                );
                Err(OrderError::UpstreamGateway(format!(
                    "{} timed out after {:?}",
                    call, self.settings.timeout
                )))
            }
        }
    }
}

fn refund_key(order_id: Uuid) -> String {
    format!("refund:{}", order_id)
}

fn mark_order_paid(order: &mut Order, result: PaymentResult) {
    if order.is_paid {
        return;
    }
    order.mark_paid(result);
    if order.order_status == OrderStatus::Pending {
        order.order_status = OrderStatus::Confirmed;
    }
}

fn amount_mismatch(payment: &Payment, verification: &GatewayVerification) -> Option<String> {
    match verification.amount {
        Some(paid) if paid != payment.amount => Some(format!(
            "provider settled {} but {} was due",
            paid, payment.amount
        )),
        _ => None,
    }
}

fn check_refund_amount(payment: &Payment, amount: Money) -> OrderResult<()> {
    if amount.is_zero() || amount.is_negative() {
        return Err(OrderError::Validation("refund amount must be positive".into()));
    }
    if amount > payment.remaining_refundable() {
        return Err(OrderError::Validation(format!(
            "refund of {} exceeds refundable {} (paid {}, refunded {})",
            amount,
            payment.remaining_refundable(),
            payment.amount,
            payment.refund_amount
        )));
    }
    Ok(())
}
