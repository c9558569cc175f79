use axum::{
    extract::{Path, State},
    middleware,
    routing::{post, put},
    Json, Router,
};
use platter_order::{Payment, WithdrawalRequest, WithdrawalStatus};
use platter_shared::Money;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::admin_auth_middleware;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct RefundRequest {
    /// Omitted means refund whatever is still refundable
    pub amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalDecision {
    pub status: WithdrawalStatus,
    pub note: Option<String>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/orders/{id}/refund", post(refund_order))
        .route("/v1/admin/withdrawals/{id}/status", put(update_withdrawal))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

async fn refund_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(
        state.payments.refund_transaction(order_id, req.amount).await?,
    ))
}

async fn update_withdrawal(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Json(req): Json<WithdrawalDecision>,
) -> Result<Json<WithdrawalRequest>, AppError> {
    Ok(Json(
        state
            .wallet
            .update_withdrawal_status(request_id, req.status, req.note)
            .await?,
    ))
}
