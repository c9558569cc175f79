use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use platter_core::Identity;
use platter_order::{CheckoutRequest, Order, OrderStatus, PaymentMethod};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::{customer_auth_middleware, identity_middleware};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub status: OrderStatus,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let customer = Router::new()
        .route("/v1/orders", post(checkout).get(list_orders))
        .route("/v1/orders/{id}/cancel", post(cancel_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), customer_auth_middleware));

    // Customers, vendors with a slice, and admins can all read a single order
    let shared = Router::new()
        .route("/v1/orders/{id}", get(get_order))
        .route_layer(middleware::from_fn_with_state(state, identity_middleware));

    customer.merge(shared)
}

pub(crate) fn method_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
        PaymentMethod::Gateway => "GATEWAY",
    }
}

async fn checkout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.checkout.checkout(identity.id, req).await?;

    state
        .metrics
        .checkouts_total
        .with_label_values(&[method_label(order.payment_method)])
        .inc();

    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.fulfillment.list_customer_orders(identity.id).await?))
}

async fn get_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.fulfillment.get_order(&identity, id).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        state.fulfillment.cancel_order(&identity, id, req.status).await?,
    ))
}
