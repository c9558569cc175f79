use chrono::Utc;
use platter_core::{notify_quietly, Notifier, ProductCatalog, ProductSnapshot};
use platter_shared::models::{NotificationEvent, NotificationKind, RecipientKind};
use platter_shared::Money;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};
use crate::models::{
    Cart, Order, OrderItem, OrderStatus, PaymentMethod, PriceBreakdown, ShippingAddress,
    VendorOrder, VendorOrderStatus, MAX_SPECIAL_INSTRUCTIONS,
};
use crate::repository::{CartRepository, OrderRepository};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    /// Totals the client showed the shopper; must agree with what the cart decomposes to
    pub price: PriceBreakdown,
    pub special_instructions: Option<String>,
}

/// Turns a cart into one order with a sub-order per vendor
pub struct OrderDecomposer {
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn ProductCatalog>,
    notifier: Arc<dyn Notifier>,
}

impl OrderDecomposer {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn ProductCatalog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            carts,
            orders,
            catalog,
            notifier,
        }
    }

    #[instrument(skip(self, request), fields(method = ?request.payment_method))]
    pub async fn checkout(&self, customer_id: Uuid, request: CheckoutRequest) -> OrderResult<Order> {
        request.shipping_address.validate()?;
        let special_instructions = normalize_instructions(request.special_instructions)?;

        let cart = self
            .carts
            .get_cart(customer_id)
            .await?
            .unwrap_or_else(|| Cart::new(customer_id));
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let products = self.resolve_products(&cart).await?;
        let (order_items, vendor_orders) = decompose(&cart, &products)?;

        let items_price: Money = vendor_orders.iter().map(|vo| vo.subtotal).sum();
        let shipping_price: Money = vendor_orders.iter().map(|vo| vo.delivery_fee).sum();
        let price = reconcile_quote(&request.price, items_price, shipping_price)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            customer_id,
            order_items,
            vendor_orders,
            shipping_address: request.shipping_address,
            payment_method: request.payment_method,
            price,
            is_paid: false,
            paid_at: None,
            payment_result: None,
            order_status: OrderStatus::Pending,
            is_delivered: false,
            delivered_at: None,
            special_instructions,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        self.orders.insert_order(&order).await?;
        tracing::info!(
            "Order {} created for customer {} with {} vendor sub-orders, total {}",
            order.id,
            customer_id,
            order.vendor_orders.len(),
            order.price.total_price
        );

        // Gateway-paid carts stay intact until the provider confirms payment
        if order.payment_method == PaymentMethod::CashOnDelivery {
            if let Err(e) = self.carts.clear_cart(customer_id).await {
                tracing::error!("Failed to clear cart after COD order {}: {}", order.id, e);
            }
            notify_vendors_of_new_order(self.notifier.as_ref(), &order).await;
        }

        notify_quietly(
            self.notifier.as_ref(),
            NotificationEvent::new(
                customer_id,
                RecipientKind::Customer,
                NotificationKind::OrderPlaced,
                serde_json::json!({
                    "order_id": order.id,
                    "total_price": order.price.total_price,
                    "payment_method": order.payment_method,
                }),
            ),
        )
        .await;

        Ok(order)
    }

    async fn resolve_products(&self, cart: &Cart) -> OrderResult<HashMap<Uuid, ProductSnapshot>> {
        let mut products = HashMap::new();
        for line in &cart.lines {
            if products.contains_key(&line.product_id) {
                continue;
            }
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;
            products.insert(line.product_id, product);
        }
        Ok(products)
    }
}

/// Groups cart lines by vendor, in order of first appearance.
///
/// Charges the cart's price snapshots; only vendor identity and delivery fee
/// come from the live catalog.
pub fn decompose(
    cart: &Cart,
    products: &HashMap<Uuid, ProductSnapshot>,
) -> OrderResult<(Vec<OrderItem>, Vec<VendorOrder>)> {
    let now = Utc::now();
    let mut order_items = Vec::with_capacity(cart.lines.len());
    let mut vendor_orders: Vec<VendorOrder> = Vec::new();
    let mut slot_by_vendor: HashMap<Uuid, usize> = HashMap::new();

    for line in &cart.lines {
        let product = products
            .get(&line.product_id)
            .ok_or(OrderError::ProductNotFound(line.product_id))?;

        let item = OrderItem {
            id: Uuid::new_v4(),
            product_id: line.product_id,
            name: line.product_name.clone(),
            quantity: line.quantity,
            selected_options: line.selected_options.clone(),
            unit_price: line.unit_price,
        };

        let slot = *slot_by_vendor.entry(product.vendor_id).or_insert_with(|| {
            vendor_orders.push(VendorOrder {
                vendor_id: product.vendor_id,
                vendor_name: product.vendor_name.clone(),
                items: Vec::new(),
                subtotal: Money::ZERO,
                delivery_fee: product.vendor_delivery_fee,
                status: VendorOrderStatus::Pending,
                updated_at: now,
            });
            vendor_orders.len() - 1
        });

        let vendor_order = vendor_orders
            .get_mut(slot)
            .ok_or_else(|| OrderError::Storage("vendor slot out of range".into()))?;
        vendor_order.subtotal += item.line_total();
        vendor_order.items.push(item.clone());
        order_items.push(item);
    }

    Ok((order_items, vendor_orders))
}

fn reconcile_quote(
    quote: &PriceBreakdown,
    items_price: Money,
    shipping_price: Money,
) -> OrderResult<PriceBreakdown> {
    if quote.items_price != items_price {
        return Err(OrderError::Validation(format!(
            "items price {} does not match cart total {}",
            quote.items_price, items_price
        )));
    }
    if quote.shipping_price != shipping_price {
        return Err(OrderError::Validation(format!(
            "shipping price {} does not match vendor delivery fees {}",
            quote.shipping_price, shipping_price
        )));
    }
    if quote.tax_price.is_negative() {
        return Err(OrderError::Validation("tax price cannot be negative".into()));
    }
    if !quote.is_consistent() {
        return Err(OrderError::Validation(format!(
            "total price {} is not items + tax + shipping",
            quote.total_price
        )));
    }
    PriceBreakdown::checked(items_price, quote.tax_price, shipping_price)
}

fn normalize_instructions(raw: Option<String>) -> OrderResult<Option<String>> {
    match raw.map(|s| s.trim().to_string()) {
        Some(s) if s.is_empty() => Ok(None),
        Some(s) if s.chars().count() > MAX_SPECIAL_INSTRUCTIONS => Err(OrderError::Validation(
            format!("special instructions exceed {} characters", MAX_SPECIAL_INSTRUCTIONS),
        )),
        other => Ok(other),
    }
}

pub(crate) async fn notify_vendors_of_new_order(notifier: &dyn Notifier, order: &Order) {
    for vendor_order in &order.vendor_orders {
        notify_quietly(
            notifier,
            NotificationEvent::new(
                vendor_order.vendor_id,
                RecipientKind::Vendor,
                NotificationKind::NewVendorOrder,
                serde_json::json!({
                    "order_id": order.id,
                    "items": vendor_order.items.len(),
                    "subtotal": vendor_order.subtotal,
                }),
            ),
        )
        .await;
    }
}
