//! Paystack REST client.
//!
//! Amounts cross the wire in minor units (kobo for NGN).

use async_trait::async_trait;
use platter_core::{
    CoreError, CoreResult, GatewayRefund, GatewayTransaction, GatewayVerification,
    InitializeTransaction, PaymentGateway, ProviderOutcome,
};
use platter_shared::Money;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    /// e.g. `https://api.paystack.co`
    pub base_url: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct PaystackGateway {
    config: PaystackConfig,
    http: Client,
}

/// Every Paystack response wraps its payload the same way
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: String,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RefundData {
    status: String,
}

/// Paystack transaction statuses that settle the payment one way or the other;
/// anything else is still in flight.
pub(crate) fn outcome_for(status: &str) -> ProviderOutcome {
    match status {
        "success" => ProviderOutcome::Succeeded,
        "failed" | "reversed" => ProviderOutcome::Failed,
        _ => ProviderOutcome::Pending,
    }
}

fn minor_units(amount: Money) -> CoreResult<i64> {
    amount
        .to_minor()
        .map_err(|e| CoreError::ValidationError(e.to_string()))
}

impl PaystackGateway {
    pub fn new(config: PaystackConfig) -> Self {
        Self {
            config,
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        call: &str,
        response: reqwest::Response,
    ) -> CoreResult<(T, serde_json::Value)> {
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::UpstreamError(format!("paystack {}: {}", call, e)))?;

        if !status.is_success() {
            return Err(CoreError::UpstreamError(format!(
                "paystack {} failed with status {}: {}",
                call, status, body
            )));
        }

        let envelope: Envelope<T> = serde_json::from_value(body.clone())
            .map_err(|e| CoreError::UpstreamError(format!("paystack {}: unexpected body: {}", call, e)))?;
        match envelope.data {
            Some(data) if envelope.status => Ok((data, body)),
            _ => Err(CoreError::UpstreamError(format!(
                "paystack {} rejected: {}",
                call, envelope.message
            ))),
        }
    }
}

fn transport(call: &str) -> impl Fn(reqwest::Error) -> CoreError + '_ {
    move |e| {
        if e.is_timeout() {
            CoreError::TimeoutError(format!("paystack {}", call))
        } else {
            CoreError::UpstreamError(format!("paystack {}: {}", call, e))
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    fn name(&self) -> &str {
        "paystack"
    }

    async fn initialize_transaction(
        &self,
        request: &InitializeTransaction,
    ) -> CoreResult<GatewayTransaction> {
        let body = serde_json::json!({
            "email": request.email,
            "amount": minor_units(request.amount)?,
            "currency": request.currency,
            "callback_url": request.callback_url,
            "metadata": request.metadata,
        });

        let response = self
            .http
            .post(self.url("/transaction/initialize"))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(transport("initialize"))?;

        let (data, _): (InitializeData, _) = self.read("initialize", response).await?;
        Ok(GatewayTransaction {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> CoreResult<GatewayVerification> {
        let response = self
            .http
            .get(self.url(&format!("/transaction/verify/{}", reference)))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await
            .map_err(transport("verify"))?;

        let (data, body): (VerifyData, _) = self.read("verify", response).await?;
        Ok(GatewayVerification {
            outcome: outcome_for(&data.status),
            amount: data.amount.map(Money::from_minor),
            provider_status: data.status,
            payload: body,
        })
    }

    async fn refund_transaction(&self, reference: &str, amount: Money) -> CoreResult<GatewayRefund> {
        let body = serde_json::json!({
            "transaction": reference,
            "amount": minor_units(amount)?,
        });

        let response = self
            .http
            .post(self.url("/refund"))
            .bearer_auth(&self.config.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(transport("refund"))?;

        let (data, body): (RefundData, _) = self.read("refund", response).await?;
        Ok(GatewayRefund {
            provider_status: data.status,
            payload: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(outcome_for("success"), ProviderOutcome::Succeeded);
        assert_eq!(outcome_for("failed"), ProviderOutcome::Failed);
        assert_eq!(outcome_for("abandoned"), ProviderOutcome::Pending);
        assert_eq!(outcome_for("ongoing"), ProviderOutcome::Pending);
    }

    #[test]
    fn test_verify_envelope_parses() {
        let body = r#"{
            "status": true,
            "message": "Verification successful",
            "data": { "status": "success", "amount": 2100, "reference": "ref_1", "gateway_response": "Approved" }
        }"#;
        let envelope: Envelope<VerifyData> = serde_json::from_str(body).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.status, "success");
        assert_eq!(data.amount.map(Money::from_minor), Some(Money::from_major(21)));
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(minor_units("10.50".parse().unwrap()).unwrap(), 1050);
    }

    #[test]
    fn test_url_join() {
        let gateway = PaystackGateway::new(PaystackConfig {
            base_url: "https://api.paystack.co/".into(),
            secret_key: "sk_test".into(),
        });
        assert_eq!(
            gateway.url("/transaction/verify/abc"),
            "https://api.paystack.co/transaction/verify/abc"
        );
    }
}
