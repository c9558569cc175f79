use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use platter_core::Identity;
use platter_order::{
    LedgerEntry, Order, OrderStatus, PaymentMethod, ShippingAddress, VendorOrder,
    VendorOrderStatus, WalletBalance, WithdrawalMethod, WithdrawalRequest,
};
use platter_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::vendor_auth_middleware;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: VendorOrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Money,
    pub method: WithdrawalMethod,
}

/// A vendor's view of an order: its own slice plus what it needs to deliver
#[derive(Debug, Serialize)]
pub struct VendorOrderView {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub is_paid: bool,
    pub order_status: OrderStatus,
    pub special_instructions: Option<String>,
    pub vendor_order: VendorOrder,
    pub created_at: DateTime<Utc>,
}

impl VendorOrderView {
    fn project(order: Order, vendor_id: Uuid) -> Option<Self> {
        let vendor_order = order.vendor_order(vendor_id)?.clone();
        Some(Self {
            order_id: order.id,
            customer_id: order.customer_id,
            shipping_address: order.shipping_address,
            payment_method: order.payment_method,
            is_paid: order.is_paid,
            order_status: order.order_status,
            special_instructions: order.special_instructions,
            vendor_order,
            created_at: order.created_at,
        })
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/vendor/orders", get(list_orders))
        .route("/v1/vendor/orders/{id}/status", put(update_status))
        .route("/v1/vendor/wallet", get(get_wallet))
        .route("/v1/vendor/wallet/statement", get(get_statement))
        .route(
            "/v1/vendor/wallet/withdrawals",
            get(list_withdrawals).post(request_withdrawal),
        )
        .route_layer(middleware::from_fn_with_state(state, vendor_auth_middleware))
}

async fn list_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<VendorOrderView>>, AppError> {
    let orders = state.fulfillment.list_vendor_orders(identity.id).await?;
    Ok(Json(
        orders
            .into_iter()
            .filter_map(|order| VendorOrderView::project(order, identity.id))
            .collect(),
    ))
}

async fn update_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<VendorOrderView>, AppError> {
    let order = state
        .fulfillment
        .update_vendor_order_status(order_id, identity.id, req.status)
        .await?;
    VendorOrderView::project(order, identity.id)
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("order {}", order_id)))
}

async fn get_wallet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<WalletBalance>, AppError> {
    Ok(Json(state.wallet.get_balance(identity.id).await?))
}

async fn get_statement(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<LedgerEntry>>, AppError> {
    Ok(Json(state.wallet.statement(identity.id).await?))
}

async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<WithdrawalRequest>>, AppError> {
    Ok(Json(state.wallet.list_withdrawals(identity.id).await?))
}

async fn request_withdrawal(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<WithdrawalBody>,
) -> Result<(StatusCode, Json<WithdrawalRequest>), AppError> {
    let request = state
        .wallet
        .request_withdrawal(identity.id, req.amount, req.method)
        .await?;
    state.metrics.withdrawal_requests_total.inc();
    Ok((StatusCode::CREATED, Json(request)))
}
