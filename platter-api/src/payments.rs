use axum::{
    extract::{Path, State},
    middleware,
    routing::post,
    Extension, Json, Router,
};
use platter_core::Identity;
use platter_order::{InitializedPayment, OrderError, PaymentStatus, VerifiedPayment};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::customer_auth_middleware;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub reference: String,
}

/// Provider callback. Only the reference is read; the outcome is always re-verified.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub reference: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub status: PaymentStatus,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}/payment", post(initialize_payment))
        .route("/v1/orders/{id}/payment/verify", post(verify_payment))
        .route_layer(middleware::from_fn_with_state(state, customer_auth_middleware))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(payment_webhook))
}

fn status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "PENDING",
        PaymentStatus::Completed => "COMPLETED",
        PaymentStatus::Failed => "FAILED",
        PaymentStatus::Refunded => "REFUNDED",
    }
}

async fn initialize_payment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<Json<InitializedPayment>, AppError> {
    if req.email.trim().is_empty() {
        return Err(AppError::ValidationError("email is required".into()));
    }
    let initialized = state
        .payments
        .initialize_payment(identity.id, order_id, &req.email)
        .await?;
    Ok(Json(initialized))
}

async fn verify_payment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifiedPayment>, AppError> {
    // Ownership check before touching the provider
    state.fulfillment.get_order(&identity, order_id).await?;

    let result = state.payments.verify_payment(order_id, &req.reference).await;
    record_verification(&state, &result);
    Ok(Json(result?))
}

async fn payment_webhook(
    State(state): State<AppState>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<WebhookAck>, AppError> {
    tracing::info!("Payment webhook {} for {}", event.event, event.data.reference);

    let result = state.payments.verify_by_reference(&event.data.reference).await;
    record_verification(&state, &result);

    match result {
        Ok(verified) => Ok(Json(WebhookAck {
            received: true,
            status: verified.payment.status,
        })),
        // A declined charge is a settled answer; the provider need not redeliver
        Err(OrderError::PaymentFailed(reason)) => {
            tracing::warn!("Webhook {} reported a failed charge: {}", event.data.reference, reason);
            Ok(Json(WebhookAck {
                received: true,
                status: PaymentStatus::Failed,
            }))
        }
        Err(e) => {
            if e.is_retryable() {
                tracing::warn!("Webhook {} not settled, expecting redelivery: {}", event.data.reference, e);
            }
            Err(e.into())
        }
    }
}

fn record_verification(state: &AppState, result: &Result<VerifiedPayment, OrderError>) {
    let label = match result {
        Ok(verified) => status_label(verified.payment.status),
        Err(OrderError::PaymentFailed(_)) => status_label(PaymentStatus::Failed),
        Err(_) => return,
    };
    state
        .metrics
        .payments_verified_total
        .with_label_values(&[label])
        .inc();
}
