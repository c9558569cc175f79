use async_trait::async_trait;
use platter_core::{
    CoreError, CoreResult, GatewayRefund, GatewayTransaction, GatewayVerification,
    InitializeTransaction, PaymentGateway, ProviderOutcome,
};
use platter_shared::Money;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scriptable provider for tests and `gateway.provider = "mock"`.
///
/// Remembers the amount of every transaction it opened so verification echoes it back.
pub struct MockGateway {
    outcome: Mutex<ProviderOutcome>,
    delay: Option<Duration>,
    amounts: Mutex<HashMap<String, Money>>,
    refunds: Mutex<Vec<(String, Money)>>,
    initialize_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl MockGateway {
    /// Every verification succeeds
    pub fn new() -> Self {
        Self::with_outcome(ProviderOutcome::Succeeded)
    }

    pub fn with_outcome(outcome: ProviderOutcome) -> Self {
        Self {
            outcome: Mutex::new(outcome),
            delay: None,
            amounts: Mutex::new(HashMap::new()),
            refunds: Mutex::new(Vec::new()),
            initialize_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps for `delay` before answering
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn set_outcome(&self, outcome: ProviderOutcome) {
        if let Ok(mut current) = self.outcome.lock() {
            *current = outcome;
        }
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.refunds.lock().map(|r| r.clone()).unwrap_or_default()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> CoreError {
    CoreError::InternalError("mock gateway state poisoned".into())
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize_transaction(
        &self,
        request: &InitializeTransaction,
    ) -> CoreResult<GatewayTransaction> {
        let n = self.initialize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;

        let reference = format!("mock_ref_{}_{}", request.order_id.simple(), n);
        self.amounts
            .lock()
            .map_err(poisoned)?
            .insert(reference.clone(), request.amount);

        Ok(GatewayTransaction {
            authorization_url: format!("https://checkout.mock.local/{}", reference),
            access_code: format!("mock_access_{}", n),
            reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> CoreResult<GatewayVerification> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let outcome = *self.outcome.lock().map_err(poisoned)?;
        let amount = self.amounts.lock().map_err(poisoned)?.get(reference).copied();
        let provider_status = match outcome {
            ProviderOutcome::Succeeded => "success",
            ProviderOutcome::Failed => "failed",
            ProviderOutcome::Pending => "ongoing",
        };

        Ok(GatewayVerification {
            outcome,
            provider_status: provider_status.to_string(),
            amount,
            payload: serde_json::json!({ "reference": reference, "status": provider_status }),
        })
    }

    async fn refund_transaction(&self, reference: &str, amount: Money) -> CoreResult<GatewayRefund> {
        self.pause().await;
        self.refunds
            .lock()
            .map_err(poisoned)?
            .push((reference.to_string(), amount));
        Ok(GatewayRefund {
            provider_status: "processed".into(),
            payload: serde_json::json!({ "transaction": reference, "amount": amount }),
        })
    }
}
