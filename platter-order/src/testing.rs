//! Fixtures shared by the unit tests of this crate.

use chrono::Utc;
use platter_shared::Money;
use uuid::Uuid;

use crate::models::{
    Order, OrderItem, OrderStatus, PaymentMethod, PriceBreakdown, ShippingAddress, VendorOrder,
    VendorOrderStatus,
};

pub fn address() -> ShippingAddress {
    ShippingAddress {
        street: "12 Allen Avenue".into(),
        city: "Ikeja".into(),
        state: Some("Lagos".into()),
        postal_code: None,
        phone: "+2348000000000".into(),
    }
}

/// An order with one sub-order per `(vendor, subtotal)` pair and a 1.00 delivery fee each
pub fn order_for(customer_id: Uuid, vendors: &[(Uuid, i64)], method: PaymentMethod) -> Order {
    let now = Utc::now();
    let mut order_items = Vec::new();
    let vendor_orders: Vec<VendorOrder> = vendors
        .iter()
        .map(|(vendor_id, subtotal)| {
            let item = OrderItem {
                id: Uuid::new_v4(),
                product_id: Uuid::new_v4(),
                name: "Suya Platter".into(),
                quantity: 1,
                selected_options: vec![],
                unit_price: Money::from_major(*subtotal),
            };
            order_items.push(item.clone());
            VendorOrder {
                vendor_id: *vendor_id,
                vendor_name: format!("Vendor {}", &vendor_id.to_string()[..4]),
                items: vec![item],
                subtotal: Money::from_major(*subtotal),
                delivery_fee: Money::from_major(1),
                status: VendorOrderStatus::Pending,
                updated_at: now,
            }
        })
        .collect();

    let items_price: Money = vendor_orders.iter().map(|vo| vo.subtotal).sum();
    let shipping_price: Money = vendor_orders.iter().map(|vo| vo.delivery_fee).sum();

    Order {
        id: Uuid::new_v4(),
        customer_id,
        order_items,
        vendor_orders,
        shipping_address: address(),
        payment_method: method,
        price: PriceBreakdown::new(items_price, Money::ZERO, shipping_price),
        is_paid: false,
        paid_at: None,
        payment_result: None,
        order_status: OrderStatus::Pending,
        is_delivered: false,
        delivered_at: None,
        special_instructions: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}
