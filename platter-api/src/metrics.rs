use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

/// Business counters, scraped from `/metrics`
pub struct Metrics {
    registry: Registry,
    pub checkouts_total: IntCounterVec,
    pub payments_verified_total: IntCounterVec,
    pub withdrawal_requests_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let checkouts_total = IntCounterVec::new(
            Opts::new("platter_checkouts_total", "Orders placed, by payment method"),
            &["method"],
        )?;
        let payments_verified_total = IntCounterVec::new(
            Opts::new(
                "platter_payments_verified_total",
                "Payment verifications, by resulting payment status",
            ),
            &["status"],
        )?;
        let withdrawal_requests_total = IntCounter::new(
            "platter_withdrawal_requests_total",
            "Withdrawal requests accepted",
        )?;

        registry.register(Box::new(checkouts_total.clone()))?;
        registry.register(Box::new(payments_verified_total.clone()))?;
        registry.register(Box::new(withdrawal_requests_total.clone()))?;

        Ok(Self {
            registry,
            checkouts_total,
            payments_verified_total,
            withdrawal_requests_total,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
