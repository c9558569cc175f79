pub mod models;
pub mod error;
pub mod repository;
pub mod cart;
pub mod decomposer;
pub mod fulfillment;
pub mod reconciliation;
pub mod gateway;
pub mod wallet;
pub mod memory;

#[cfg(test)]
mod testing;

pub use models::{
    Cart, CartLine, Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus,
    PriceBreakdown, RefundStatus, SelectedOption, ShippingAddress, VendorOrder, VendorOrderStatus,
    VendorProfile, WithdrawalMethod, WithdrawalRequest, WithdrawalStatus,
};
pub use error::{OrderError, OrderResult};
pub use cart::CartService;
pub use decomposer::{CheckoutRequest, OrderDecomposer};
pub use fulfillment::FulfillmentService;
pub use reconciliation::{InitializedPayment, PaymentReconciler, PaymentSettings, VerifiedPayment};
pub use gateway::MockGateway;
pub use wallet::{LedgerEntry, Settlement, WalletBalance, WalletLedger, WalletSettings};
pub use memory::InMemoryStore;
