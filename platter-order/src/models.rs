use chrono::{DateTime, Utc};
use platter_shared::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OrderError, OrderResult};

pub const MAX_SPECIAL_INSTRUCTIONS: usize = 500;
/// Ceiling on a single cart line, merged quantities included
pub const MAX_LINE_QUANTITY: u32 = 99;

// ============================================================================
// Cart
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedOption {
    pub option_name: String,
    pub choice_value: String,
}

/// A pending line; `unit_price` is captured when the line is added and is what checkout charges
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    #[serde(default)]
    pub selected_options: Vec<SelectedOption>,
    pub unit_price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cart {
    pub customer_id: Uuid,
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(customer_id: Uuid) -> Self {
        Self {
            customer_id,
            lines: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Merges into an existing line when product and option list match exactly
    pub fn add_line(&mut self, line: CartLine) -> OrderResult<()> {
        check_quantity(line.quantity)?;

        match self.lines.iter_mut().find(|l| {
            l.product_id == line.product_id && l.selected_options == line.selected_options
        }) {
            Some(existing) => {
                let merged = existing
                    .quantity
                    .checked_add(line.quantity)
                    .filter(|q| *q <= MAX_LINE_QUANTITY)
                    .ok_or_else(|| {
                        OrderError::Validation(format!(
                            "{} x {} would exceed {} per line",
                            existing.quantity, existing.product_name, MAX_LINE_QUANTITY
                        ))
                    })?;
                existing.quantity = merged;
            }
            None => self.lines.push(line),
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Quantity 0 drops the line
    pub fn set_quantity(&mut self, index: usize, quantity: u32) -> OrderResult<()> {
        if quantity == 0 {
            return self.remove_line(index);
        }
        check_quantity(quantity)?;
        let line = self
            .lines
            .get_mut(index)
            .ok_or_else(|| OrderError::NotFound(format!("cart line {}", index)))?;
        line.quantity = quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn remove_line(&mut self, index: usize) -> OrderResult<()> {
        if index >= self.lines.len() {
            return Err(OrderError::NotFound(format!("cart line {}", index)));
        }
        self.lines.remove(index);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.updated_at = Utc::now();
    }
}

pub fn check_quantity(quantity: u32) -> OrderResult<()> {
    if quantity == 0 {
        return Err(OrderError::Validation("quantity must be at least 1".into()));
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(OrderError::Validation(format!(
            "quantity {} exceeds the limit of {}",
            quantity, MAX_LINE_QUANTITY
        )));
    }
    Ok(())
}

// ============================================================================
// Order
// ============================================================================

/// Aggregate (customer-facing) order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Ready,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Position along the forward path; terminal exits rank highest
    pub(crate) fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Confirmed => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Ready => 3,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded => 4,
        }
    }
}

/// Per-vendor sub-order status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VendorOrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CashOnDelivery,
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub phone: String,
}

impl ShippingAddress {
    pub fn validate(&self) -> OrderResult<()> {
        let missing: Vec<&str> = [
            ("street", &self.street),
            ("city", &self.city),
            ("phone", &self.phone),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(OrderError::Validation(format!(
                "shipping address is missing {}",
                missing.join(", ")
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub items_price: Money,
    pub tax_price: Money,
    pub shipping_price: Money,
    pub total_price: Money,
}

impl PriceBreakdown {
    pub fn new(items_price: Money, tax_price: Money, shipping_price: Money) -> Self {
        Self {
            items_price,
            tax_price,
            shipping_price,
            total_price: items_price + tax_price + shipping_price,
        }
    }

    /// Like [`PriceBreakdown::new`] for amounts a client supplied; refuses
    /// totals outside the representable range instead of panicking.
    pub fn checked(items_price: Money, tax_price: Money, shipping_price: Money) -> OrderResult<Self> {
        let total_price = sum_of(items_price, tax_price, shipping_price).ok_or_else(|| {
            OrderError::Validation("price components are out of range".into())
        })?;
        Ok(Self {
            items_price,
            tax_price,
            shipping_price,
            total_price,
        })
    }

    pub fn is_consistent(&self) -> bool {
        sum_of(self.items_price, self.tax_price, self.shipping_price) == Some(self.total_price)
    }
}

fn sum_of(items: Money, tax: Money, shipping: Money) -> Option<Money> {
    items.checked_add(tax)?.checked_add(shipping)
}

/// Receipt line; the same `id` appears once in `Order::order_items` and once in a vendor slice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub selected_options: Vec<SelectedOption>,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorOrder {
    pub vendor_id: Uuid,
    pub vendor_name: String,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub status: VendorOrderStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentResult {
    pub reference: String,
    pub provider_status: String,
    pub paid_at: DateTime<Utc>,
}

/// Root aggregate. Vendor sub-orders are owned inline so the whole order is one document write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_items: Vec<OrderItem>,
    pub vendor_orders: Vec<VendorOrder>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub price: PriceBreakdown,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_result: Option<PaymentResult>,
    pub order_status: OrderStatus,
    pub is_delivered: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub special_instructions: Option<String>,
    /// Optimistic concurrency token, bumped by the store on every write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn vendor_order(&self, vendor_id: Uuid) -> Option<&VendorOrder> {
        self.vendor_orders.iter().find(|vo| vo.vendor_id == vendor_id)
    }

    pub fn vendor_order_mut(&mut self, vendor_id: Uuid) -> Option<&mut VendorOrder> {
        self.vendor_orders.iter_mut().find(|vo| vo.vendor_id == vendor_id)
    }

    pub fn has_vendor(&self, vendor_id: Uuid) -> bool {
        self.vendor_order(vendor_id).is_some()
    }

    pub fn mark_paid(&mut self, result: PaymentResult) {
        self.is_paid = true;
        self.paid_at = Some(result.paid_at);
        self.payment_result = Some(result);
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// Payment
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    None,
    Partial,
    Full,
}

/// One per order, shared by every vendor slice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    /// Provider reference of the latest initialization, or of the one that was paid
    pub transaction_id: String,
    /// References replaced by a later initialization; a charge on any of them still settles
    #[serde(default)]
    pub previous_references: Vec<String>,
    pub authorization_url: Option<String>,
    pub payment_details: serde_json::Value,
    pub failure_reason: Option<String>,
    pub refund_amount: Money,
    pub refund_status: RefundStatus,
    pub refunded_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn remaining_refundable(&self) -> Money {
        (self.amount - self.refund_amount).non_negative()
    }

    pub fn has_reference(&self, reference: &str) -> bool {
        self.transaction_id == reference || self.previous_references.iter().any(|r| r == reference)
    }

    /// Makes `reference` current, keeping the replaced one as a previous reference
    pub fn adopt_reference(&mut self, reference: &str) {
        if self.transaction_id == reference {
            return;
        }
        self.previous_references.retain(|r| r != reference);
        let replaced = std::mem::replace(&mut self.transaction_id, reference.to_string());
        self.previous_references.push(replaced);
    }
}

// ============================================================================
// Vendor & withdrawals
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorProfile {
    pub id: Uuid,
    pub name: String,
    /// Percentage of each sub-order subtotal kept by the platform
    pub commission_rate: Decimal,
    pub delivery_fee: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Pending, Rejected) | (Processing, Rejected)
        )
    }

    /// Counts against the requestable balance until resolved
    pub fn is_open(&self) -> bool {
        matches!(self, WithdrawalStatus::Pending | WithdrawalStatus::Processing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalMethod {
    BankTransfer {
        bank_name: String,
        account_number: String,
        account_name: String,
    },
    MobileMoney {
        provider: String,
        phone: String,
    },
}

impl WithdrawalMethod {
    pub fn validate(&self) -> OrderResult<()> {
        let fields: Vec<&String> = match self {
            WithdrawalMethod::BankTransfer {
                bank_name,
                account_number,
                account_name,
            } => vec![bank_name, account_number, account_name],
            WithdrawalMethod::MobileMoney { provider, phone } => vec![provider, phone],
        };
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(OrderError::Validation(
                "withdrawal method details are incomplete".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub amount: Money,
    pub method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub note: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: Uuid, quantity: u32, options: Vec<SelectedOption>) -> CartLine {
        CartLine {
            product_id,
            product_name: "Jollof Rice".into(),
            quantity,
            selected_options: options,
            unit_price: Money::from_major(10),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_cart_merges_identical_lines() {
        let mut cart = Cart::new(Uuid::new_v4());
        let product = Uuid::new_v4();
        let spicy = vec![SelectedOption {
            option_name: "Heat".into(),
            choice_value: "Hot".into(),
        }];

        cart.add_line(line(product, 1, vec![])).unwrap();
        cart.add_line(line(product, 2, vec![])).unwrap();
        cart.add_line(line(product, 1, spicy)).unwrap();

        assert_eq!(cart.lines.len(), 2);
        assert_eq!(cart.lines[0].quantity, 3);
        assert_eq!(cart.subtotal(), Money::from_major(40));
    }

    #[test]
    fn test_cart_rejects_zero_quantity() {
        let mut cart = Cart::new(Uuid::new_v4());
        let result = cart.add_line(line(Uuid::new_v4(), 0, vec![]));
        assert!(matches!(result, Err(OrderError::Validation(_))));
    }

    #[test]
    fn test_cart_quantity_update_and_remove() {
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(Uuid::new_v4(), 1, vec![])).unwrap();
        cart.add_line(line(Uuid::new_v4(), 1, vec![])).unwrap();

        cart.set_quantity(1, 4).unwrap();
        assert_eq!(cart.lines[1].quantity, 4);

        cart.set_quantity(0, 0).unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert!(matches!(cart.remove_line(3), Err(OrderError::NotFound(_))));
    }

    #[test]
    fn test_price_breakdown_identity() {
        let price = PriceBreakdown::new(Money::from_major(25), Money::from_minor(188), Money::from_major(3));
        assert!(price.is_consistent());
        assert_eq!(price.total_price.to_string(), "29.88");
    }

    #[test]
    fn test_checked_breakdown_refuses_overflow() {
        let huge = Money::new(Decimal::MAX);
        assert!(PriceBreakdown::checked(Money::from_major(25), huge, Money::from_major(3)).is_err());

        let mut quote = PriceBreakdown::new(Money::from_major(25), Money::ZERO, Money::from_major(3));
        quote.tax_price = huge;
        quote.total_price = huge;
        assert!(!quote.is_consistent());
    }

    #[test]
    fn test_merge_past_line_ceiling_is_refused() {
        let product = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(product, MAX_LINE_QUANTITY, vec![])).unwrap();

        let result = cart.add_line(line(product, 1, vec![]));
        assert!(matches!(result, Err(OrderError::Validation(_))));
        assert_eq!(cart.lines[0].quantity, MAX_LINE_QUANTITY);
        assert!(cart.add_line(line(product, u32::MAX, vec![])).is_err());
    }

    #[test]
    fn test_withdrawal_transitions() {
        assert!(WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::Processing));
        assert!(WithdrawalStatus::Processing.can_transition_to(WithdrawalStatus::Completed));
        assert!(!WithdrawalStatus::Pending.can_transition_to(WithdrawalStatus::Completed));
        assert!(!WithdrawalStatus::Completed.can_transition_to(WithdrawalStatus::Rejected));
    }

    #[test]
    fn test_withdrawal_method_validation() {
        let method = WithdrawalMethod::MobileMoney {
            provider: "MTN".into(),
            phone: " ".into(),
        };
        assert!(method.validate().is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&VendorOrderStatus::PickedUp).unwrap(),
            "\"PICKED_UP\""
        );
        assert_eq!(serde_json::to_string(&RefundStatus::Partial).unwrap(), "\"partial\"");
    }
}
