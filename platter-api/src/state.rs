use platter_core::{Authenticator, KeyedLock, Notifier, PaymentGateway, ProductCatalog};
use platter_order::repository::{CartRepository, OrderRepository, PaymentRepository, VendorRepository};
use platter_order::{
    CartService, FulfillmentService, OrderDecomposer, PaymentReconciler, PaymentSettings,
    WalletLedger, WalletSettings,
};
use std::sync::Arc;

use crate::metrics::Metrics;

/// Storage and collaborator handles the services are wired from
#[derive(Clone)]
pub struct Backends {
    pub carts: Arc<dyn CartRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub vendors: Arc<dyn VendorRepository>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub lock: Arc<dyn KeyedLock>,
}

#[derive(Clone)]
pub struct AppState {
    pub cart: Arc<CartService>,
    pub checkout: Arc<OrderDecomposer>,
    pub fulfillment: Arc<FulfillmentService>,
    pub payments: Arc<PaymentReconciler>,
    pub wallet: Arc<WalletLedger>,
    pub auth: Arc<dyn Authenticator>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        backends: Backends,
        auth: Arc<dyn Authenticator>,
        payment_settings: PaymentSettings,
        wallet_settings: WalletSettings,
    ) -> Result<Self, prometheus::Error> {
        let Backends {
            carts,
            orders,
            payments,
            vendors,
            catalog,
            gateway,
            notifier,
            lock,
        } = backends;

        Ok(Self {
            cart: Arc::new(CartService::new(carts.clone(), catalog.clone())),
            checkout: Arc::new(OrderDecomposer::new(
                carts.clone(),
                orders.clone(),
                catalog,
                notifier.clone(),
            )),
            fulfillment: Arc::new(FulfillmentService::new(orders.clone(), notifier.clone())),
            payments: Arc::new(PaymentReconciler::new(
                orders.clone(),
                payments,
                carts,
                gateway,
                notifier.clone(),
                lock.clone(),
                payment_settings,
            )),
            wallet: Arc::new(WalletLedger::new(orders, vendors, lock, notifier, wallet_settings)),
            auth,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}
