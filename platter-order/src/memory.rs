//! Process-local backend used by tests and `storage.backend = "memory"`.

use async_trait::async_trait;
use platter_core::{CoreError, CoreResult, ProductCatalog, ProductSnapshot};
use platter_shared::Money;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use crate::models::{Cart, Order, Payment, VendorProfile, WithdrawalRequest};
use crate::repository::{CartRepository, OrderRepository, PaymentRepository, VendorRepository};

#[derive(Debug, Clone)]
struct CatalogEntry {
    name: String,
    price: Money,
    vendor_id: Uuid,
}

#[derive(Default)]
pub struct InMemoryStore {
    carts: RwLock<HashMap<Uuid, Cart>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    payments: RwLock<HashMap<Uuid, Payment>>,
    vendors: RwLock<HashMap<Uuid, VendorProfile>>,
    products: RwLock<HashMap<Uuid, CatalogEntry>>,
    withdrawals: RwLock<HashMap<Uuid, WithdrawalRequest>>,
    cart_clears: AtomicUsize,
}

fn poisoned<T>(_: T) -> CoreError {
    CoreError::StorageError("in-memory store lock poisoned".into())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vendor(&self, name: &str, commission_rate: Decimal, delivery_fee: Money) -> CoreResult<Uuid> {
        let vendor = VendorProfile {
            id: Uuid::new_v4(),
            name: name.to_string(),
            commission_rate,
            delivery_fee,
        };
        let id = vendor.id;
        self.vendors.write().map_err(poisoned)?.insert(id, vendor);
        Ok(id)
    }

    pub fn set_commission_rate(&self, vendor_id: Uuid, rate: Decimal) -> CoreResult<()> {
        let mut vendors = self.vendors.write().map_err(poisoned)?;
        let vendor = vendors
            .get_mut(&vendor_id)
            .ok_or_else(|| CoreError::StorageError(format!("vendor {} missing", vendor_id)))?;
        vendor.commission_rate = rate;
        Ok(())
    }

    pub fn add_product(&self, vendor_id: Uuid, name: &str, price: Money) -> CoreResult<Uuid> {
        let id = Uuid::new_v4();
        self.products.write().map_err(poisoned)?.insert(
            id,
            CatalogEntry {
                name: name.to_string(),
                price,
                vendor_id,
            },
        );
        Ok(id)
    }

    pub fn remove_product(&self, id: Uuid) -> CoreResult<()> {
        self.products.write().map_err(poisoned)?.remove(&id);
        Ok(())
    }

    pub fn set_product_price(&self, id: Uuid, price: Money) -> CoreResult<()> {
        if let Some(entry) = self.products.write().map_err(poisoned)?.get_mut(&id) {
            entry.price = price;
        }
        Ok(())
    }

    /// Number of `clear_cart` calls served so far
    pub fn cart_clears(&self) -> usize {
        self.cart_clears.load(Ordering::SeqCst)
    }

    pub fn order_count(&self) -> usize {
        self.orders.read().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn get_product(&self, id: Uuid) -> CoreResult<Option<ProductSnapshot>> {
        let entry = match self.products.read().map_err(poisoned)?.get(&id).cloned() {
            Some(entry) => entry,
            None => return Ok(None),
        };
        let vendors = self.vendors.read().map_err(poisoned)?;
        Ok(vendors.get(&entry.vendor_id).map(|vendor| ProductSnapshot {
            id,
            name: entry.name.clone(),
            price: entry.price,
            vendor_id: vendor.id,
            vendor_name: vendor.name.clone(),
            vendor_delivery_fee: vendor.delivery_fee,
        }))
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn get_cart(&self, customer_id: Uuid) -> CoreResult<Option<Cart>> {
        Ok(self.carts.read().map_err(poisoned)?.get(&customer_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> CoreResult<()> {
        self.carts
            .write()
            .map_err(poisoned)?
            .insert(cart.customer_id, cart.clone());
        Ok(())
    }

    async fn clear_cart(&self, customer_id: Uuid) -> CoreResult<()> {
        self.cart_clears.fetch_add(1, Ordering::SeqCst);
        if let Some(cart) = self.carts.write().map_err(poisoned)?.get_mut(&customer_id) {
            cart.clear();
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> CoreResult<()> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        if orders.contains_key(&order.id) {
            return Err(CoreError::ConflictError(format!("order {} exists", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        Ok(self.orders.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn update_order(&self, order: &Order) -> CoreResult<Order> {
        let mut orders = self.orders.write().map_err(poisoned)?;
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| CoreError::StorageError(format!("order {} missing", order.id)))?;

        if stored.version != order.version {
            return Err(CoreError::ConflictError(format!(
                "order {} is at version {}, write based on {}",
                order.id, stored.version, order.version
            )));
        }

        let mut next = order.clone();
        next.version += 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn list_customer_orders(&self, customer_id: Uuid) -> CoreResult<Vec<Order>> {
        let mut list: Vec<Order> = self
            .orders
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        list.sort_by_key(|o| o.created_at);
        Ok(list)
    }

    async fn list_vendor_orders(&self, vendor_id: Uuid) -> CoreResult<Vec<Order>> {
        let mut list: Vec<Order> = self
            .orders
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|o| o.has_vendor(vendor_id))
            .cloned()
            .collect();
        list.sort_by_key(|o| o.created_at);
        Ok(list)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> CoreResult<()> {
        let mut payments = self.payments.write().map_err(poisoned)?;
        if payments.values().any(|p| p.order_id == payment.order_id) {
            return Err(CoreError::ConflictError(format!(
                "order {} already has a payment",
                payment.order_id
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment_for_order(&self, order_id: Uuid) -> CoreResult<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .map_err(poisoned)?
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn find_payment_by_reference(&self, reference: &str) -> CoreResult<Option<Payment>> {
        Ok(self
            .payments
            .read()
            .map_err(poisoned)?
            .values()
            .find(|p| p.has_reference(reference))
            .cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> CoreResult<bool> {
        let mut payments = self.payments.write().map_err(poisoned)?;
        match payments.get_mut(&payment.id) {
            Some(stored) if stored.version == payment.version => {
                let mut next = payment.clone();
                next.version += 1;
                *stored = next;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CoreError::StorageError(format!("payment {} missing", payment.id))),
        }
    }
}

#[async_trait]
impl VendorRepository for InMemoryStore {
    async fn get_vendor(&self, id: Uuid) -> CoreResult<Option<VendorProfile>> {
        Ok(self.vendors.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn list_withdrawals(&self, vendor_id: Uuid) -> CoreResult<Vec<WithdrawalRequest>> {
        let mut list: Vec<WithdrawalRequest> = self
            .withdrawals
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|w| w.vendor_id == vendor_id)
            .cloned()
            .collect();
        list.sort_by_key(|w| w.requested_at);
        Ok(list)
    }

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> CoreResult<()> {
        self.withdrawals
            .write()
            .map_err(poisoned)?
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: Uuid) -> CoreResult<Option<WithdrawalRequest>> {
        Ok(self.withdrawals.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn update_withdrawal(&self, request: &WithdrawalRequest) -> CoreResult<()> {
        let mut withdrawals = self.withdrawals.write().map_err(poisoned)?;
        match withdrawals.get_mut(&request.id) {
            Some(stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(CoreError::StorageError(format!("withdrawal {} missing", request.id))),
        }
    }
}
