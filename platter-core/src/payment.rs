use async_trait::async_trait;
use platter_shared::Money;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// Request to open a hosted checkout with the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeTransaction {
    pub email: String,
    pub amount: Money,
    pub currency: String,
    pub order_id: Uuid,
    pub callback_url: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayTransaction {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// Provider's verdict on a transaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderOutcome {
    Succeeded,
    Failed,
    /// Still in flight or otherwise undecided; callers must not settle on it
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub outcome: ProviderOutcome,
    pub provider_status: String,
    pub amount: Option<Money>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub provider_status: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    /// Open a transaction and obtain the redirect URL and reference
    async fn initialize_transaction(
        &self,
        request: &InitializeTransaction,
    ) -> CoreResult<GatewayTransaction>;

    /// Ask the provider for the authoritative status of a reference
    async fn verify_transaction(&self, reference: &str) -> CoreResult<GatewayVerification>;

    /// Return `amount` of a settled transaction to the payer
    async fn refund_transaction(&self, reference: &str, amount: Money) -> CoreResult<GatewayRefund>;
}
