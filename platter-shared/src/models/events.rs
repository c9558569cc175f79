use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientKind {
    Customer,
    Vendor,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    NewVendorOrder,
    VendorOrderStatusChanged,
    OrderCancelled,
    PaymentConfirmed,
    PaymentFailed,
    RefundProcessed,
    WithdrawalRequested,
    WithdrawalStatusChanged,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order.placed",
            NotificationKind::NewVendorOrder => "vendor_order.new",
            NotificationKind::VendorOrderStatusChanged => "vendor_order.status_changed",
            NotificationKind::OrderCancelled => "order.cancelled",
            NotificationKind::PaymentConfirmed => "payment.confirmed",
            NotificationKind::PaymentFailed => "payment.failed",
            NotificationKind::RefundProcessed => "payment.refunded",
            NotificationKind::WithdrawalRequested => "withdrawal.requested",
            NotificationKind::WithdrawalStatusChanged => "withdrawal.status_changed",
        }
    }
}

/// Message handed to the notification side-channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub recipient_kind: RecipientKind,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub timestamp: i64,
}

impl NotificationEvent {
    pub fn new(
        recipient_id: Uuid,
        recipient_kind: RecipientKind,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            recipient_kind,
            kind,
            payload,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_kind_as_snake_case() {
        let event = NotificationEvent::new(
            Uuid::new_v4(),
            RecipientKind::Vendor,
            NotificationKind::NewVendorOrder,
            serde_json::json!({ "order_id": "abc" }),
        );

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "new_vendor_order");
        assert_eq!(value["recipient_kind"], "VENDOR");
        assert_eq!(event.kind.as_str(), "vendor_order.new");
    }
}
