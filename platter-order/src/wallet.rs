//! Vendor earnings, derived on every read from paid sub-orders and completed
//! withdrawals. Nothing here stores a running balance.

use chrono::Utc;
use platter_core::{notify_quietly, KeyedLock, Lease, Notifier};
use platter_shared::models::{NotificationEvent, NotificationKind, RecipientKind};
use platter_shared::Money;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::{
    Order, OrderStatus, VendorOrderStatus, VendorProfile, WithdrawalMethod, WithdrawalRequest,
    WithdrawalStatus,
};
use crate::repository::{OrderRepository, VendorRepository};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Settlement {
    /// Delivered; counts towards `available`
    Settled,
    /// Being prepared or on its way; counts towards `pending`
    InFlight,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntry {
    Earning {
        order_id: Uuid,
        amount: Money,
        settlement: Settlement,
    },
    Withdrawal {
        request_id: Uuid,
        amount: Money,
    },
    Adjustment {
        reason: String,
        amount: Money,
    },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletBalance {
    pub available: Money,
    pub pending: Money,
    pub total_earnings: Money,
    pub total_withdrawn: Money,
    /// Sum of withdrawal requests not yet completed or rejected
    pub reserved: Money,
}

impl WalletBalance {
    pub fn from_entries<'a, I>(entries: I, reserved: Money) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        let mut balance = entries
            .into_iter()
            .fold(WalletBalance::default(), |mut acc, entry| {
                match entry {
                    LedgerEntry::Earning {
                        amount,
                        settlement: Settlement::Settled,
                        ..
                    } => acc.total_earnings += *amount,
                    LedgerEntry::Earning {
                        amount,
                        settlement: Settlement::InFlight,
                        ..
                    } => acc.pending += *amount,
                    LedgerEntry::Withdrawal { amount, .. } => acc.total_withdrawn += *amount,
                    LedgerEntry::Adjustment { amount, .. } => acc.total_earnings += *amount,
                }
                acc
            });

        balance.available = (balance.total_earnings - balance.total_withdrawn).non_negative();
        balance.reserved = reserved;
        balance
    }

    /// What a new withdrawal request may ask for
    pub fn requestable(&self) -> Money {
        (self.available - self.reserved).non_negative()
    }
}

#[derive(Debug, Clone)]
pub struct WalletSettings {
    pub minimum_withdrawal: Money,
    /// Lease on the per-vendor withdrawal lock
    pub lock_ttl: Duration,
}

impl Default for WalletSettings {
    fn default() -> Self {
        Self {
            minimum_withdrawal: Money::from_major(1000),
            lock_ttl: Duration::from_secs(30),
        }
    }
}

pub struct WalletLedger {
    orders: Arc<dyn OrderRepository>,
    vendors: Arc<dyn VendorRepository>,
    lock: Arc<dyn KeyedLock>,
    notifier: Arc<dyn Notifier>,
    settings: WalletSettings,
}

impl WalletLedger {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        vendors: Arc<dyn VendorRepository>,
        lock: Arc<dyn KeyedLock>,
        notifier: Arc<dyn Notifier>,
        settings: WalletSettings,
    ) -> Self {
        Self {
            orders,
            vendors,
            lock,
            notifier,
            settings,
        }
    }

    pub async fn get_balance(&self, vendor_id: Uuid) -> OrderResult<WalletBalance> {
        let vendor = self.load_vendor(vendor_id).await?;
        let withdrawals = self.vendors.list_withdrawals(vendor_id).await?;
        let entries = self.entries(&vendor, &withdrawals).await?;
        Ok(WalletBalance::from_entries(&entries, reserved(&withdrawals)))
    }

    /// Every entry the balance is folded from, earnings first
    pub async fn statement(&self, vendor_id: Uuid) -> OrderResult<Vec<LedgerEntry>> {
        let vendor = self.load_vendor(vendor_id).await?;
        let withdrawals = self.vendors.list_withdrawals(vendor_id).await?;
        self.entries(&vendor, &withdrawals).await
    }

    pub async fn list_withdrawals(&self, vendor_id: Uuid) -> OrderResult<Vec<WithdrawalRequest>> {
        Ok(self.vendors.list_withdrawals(vendor_id).await?)
    }

    /// Files a pending withdrawal.
    ///
    /// Runs under the vendor's wallet lock and validates against
    /// `available - reserved` so concurrent requests cannot jointly overdraw.
    #[instrument(skip(self, method))]
    pub async fn request_withdrawal(
        &self,
        vendor_id: Uuid,
        amount: Money,
        method: WithdrawalMethod,
    ) -> OrderResult<WithdrawalRequest> {
        method.validate()?;
        if amount.is_zero() || amount.is_negative() {
            return Err(OrderError::Validation("withdrawal amount must be positive".into()));
        }
        if amount < self.settings.minimum_withdrawal {
            return Err(OrderError::BelowMinimum {
                amount,
                minimum: self.settings.minimum_withdrawal,
            });
        }

        let lease = self.acquire(vendor_id).await?;
        let result = self.file_withdrawal(vendor_id, amount, method).await;
        lease.release().await;
        let request = result?;

        tracing::info!("Vendor {} requested withdrawal {} of {}", vendor_id, request.id, amount);
        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                vendor_id,
                RecipientKind::Vendor,
                NotificationKind::WithdrawalRequested,
                serde_json::json!({ "request_id": request.id, "amount": amount }),
            ),
        )
        .await;

        Ok(request)
    }

    /// Operator decision on a withdrawal request
    #[instrument(skip(self, note))]
    pub async fn update_withdrawal_status(
        &self,
        request_id: Uuid,
        status: WithdrawalStatus,
        note: Option<String>,
    ) -> OrderResult<WithdrawalRequest> {
        let existing = self
            .vendors
            .get_withdrawal(request_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("withdrawal request {}", request_id)))?;
        let vendor_id = existing.vendor_id;

        let lease = self.acquire(vendor_id).await?;
        let result = self.apply_withdrawal_status(request_id, status, note).await;
        lease.release().await;
        let request = result?;

        tracing::info!("Withdrawal {} for vendor {} is now {:?}", request.id, vendor_id, status);
        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                vendor_id,
                RecipientKind::Vendor,
                NotificationKind::WithdrawalStatusChanged,
                serde_json::json!({
                    "request_id": request.id,
                    "status": request.status,
                    "note": request.note,
                }),
            ),
        )
        .await;

        Ok(request)
    }

    async fn file_withdrawal(
        &self,
        vendor_id: Uuid,
        amount: Money,
        method: WithdrawalMethod,
    ) -> OrderResult<WithdrawalRequest> {
        let balance = self.get_balance(vendor_id).await?;
        if amount > balance.requestable() {
            return Err(OrderError::InsufficientBalance {
                requested: amount,
                available: balance.requestable(),
            });
        }

        let now = Utc::now();
        let request = WithdrawalRequest {
            id: Uuid::new_v4(),
            vendor_id,
            amount,
            method,
            status: WithdrawalStatus::Pending,
            note: None,
            requested_at: now,
            updated_at: now,
        };
        self.vendors.insert_withdrawal(&request).await?;
        Ok(request)
    }

    async fn apply_withdrawal_status(
        &self,
        request_id: Uuid,
        status: WithdrawalStatus,
        note: Option<String>,
    ) -> OrderResult<WithdrawalRequest> {
        // Re-read under the lock
        let mut request = self
            .vendors
            .get_withdrawal(request_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("withdrawal request {}", request_id)))?;
        if !request.status.can_transition_to(status) {
            return Err(OrderError::transition(request.status, status));
        }

        request.status = status;
        if note.is_some() {
            request.note = note;
        }
        request.updated_at = Utc::now();
        self.vendors.update_withdrawal(&request).await?;
        Ok(request)
    }

    async fn entries(
        &self,
        vendor: &VendorProfile,
        withdrawals: &[WithdrawalRequest],
    ) -> OrderResult<Vec<LedgerEntry>> {
        let orders = self.orders.list_vendor_orders(vendor.id).await?;

        let mut entries: Vec<LedgerEntry> = orders
            .iter()
            .filter_map(|order| earning(order, vendor))
            .collect();
        entries.extend(
            withdrawals
                .iter()
                .filter(|w| w.status == WithdrawalStatus::Completed)
                .map(|w| LedgerEntry::Withdrawal {
                    request_id: w.id,
                    amount: w.amount,
                }),
        );
        Ok(entries)
    }

    async fn load_vendor(&self, vendor_id: Uuid) -> OrderResult<VendorProfile> {
        self.vendors
            .get_vendor(vendor_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("vendor {}", vendor_id)))
    }

    async fn acquire(&self, vendor_id: Uuid) -> OrderResult<Lease> {
        match Lease::acquire(self.lock.clone(), wallet_key(vendor_id), self.settings.lock_ttl).await? {
            Some(lease) => Ok(lease),
            None => {
                tracing::debug!("Wallet for vendor {} is locked", vendor_id);
                Err(OrderError::WalletBusy)
            }
        }
    }
}

fn wallet_key(vendor_id: Uuid) -> String {
    format!("wallet:{}", vendor_id)
}

fn reserved(withdrawals: &[WithdrawalRequest]) -> Money {
    withdrawals
        .iter()
        .filter(|w| w.status.is_open())
        .map(|w| w.amount)
        .sum()
}

/// Commission uses the vendor's current rate, not the one in force when the sub-order was placed.
fn earning(order: &Order, vendor: &VendorProfile) -> Option<LedgerEntry> {
    if !order.is_paid || order.order_status == OrderStatus::Refunded {
        return None;
    }
    let vendor_order = order.vendor_order(vendor.id)?;
    let settlement = match vendor_order.status {
        VendorOrderStatus::Delivered => Settlement::Settled,
        VendorOrderStatus::Preparing | VendorOrderStatus::Ready | VendorOrderStatus::PickedUp => {
            Settlement::InFlight
        }
        VendorOrderStatus::Pending | VendorOrderStatus::Confirmed | VendorOrderStatus::Cancelled => {
            return None
        }
    };
    Some(LedgerEntry::Earning {
        order_id: order.id,
        amount: vendor_order.subtotal.after_commission(vendor.commission_rate),
        settlement,
    })
}
