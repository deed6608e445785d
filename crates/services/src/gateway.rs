//! Payment gateway collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use tokio::sync::RwLock;

use crate::error::{Error, Result};

/// An authorization request sent to the gateway.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// The order being paid.
    pub order_id: OrderId,
    /// The amount to authorize.
    pub amount: Money,
    /// Payment method, e.g. `card`.
    pub method: String,
    /// Provider to route through.
    pub provider: String,
    /// Provider-specific details (tokens, return URLs).
    pub details: HashMap<String, String>,
}

/// The gateway's answer to an authorization request.
///
/// Three outcomes are possible: success, failure (with `error_message`),
/// or requires-action (with `action_url` for a redirect flow).
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// True when funds were authorized.
    pub success: bool,
    /// The gateway's transaction reference.
    pub transaction_id: String,
    /// True when the shopper must complete an extra step.
    pub requires_action: bool,
    /// Where to send the shopper for that step.
    pub action_url: Option<String>,
    /// The gateway's message on failure.
    pub error_message: Option<String>,
}

/// One provider's availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    /// Provider name, e.g. `stripe`.
    pub provider: String,
    /// False removes it from checkout.
    pub enabled: bool,
}

/// Collaborator contract for the payment gateway.
///
/// A transport error (including a timeout) from any of these calls is
/// treated by the caller as a failure outcome, never left pending.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authorizes a payment.
    async fn authorize(&self, request: PaymentRequest) -> Result<GatewayResponse>;

    /// Captures previously authorized funds.
    async fn capture(&self, external_id: &str, amount: &Money, provider: &str) -> Result<()>;

    /// Voids a pending authorization.
    async fn void(&self, external_id: &str, provider: &str) -> Result<()>;

    /// Refunds captured or authorized funds.
    async fn refund(&self, external_id: &str, amount: &Money, provider: &str) -> Result<()>;

    /// Lists providers and their availability.
    async fn available_providers(&self) -> Result<Vec<ProviderStatus>>;
}

/// Forced outcome for the in-memory gateway's next authorizations.
#[derive(Debug, Clone, Default)]
pub enum AuthorizeOutcome {
    /// Authorize successfully.
    #[default]
    Success,
    /// Ask for shopper action with the given redirect URL.
    RequiresAction(String),
    /// Decline with the given message.
    Decline(String),
    /// Fail at the transport level (simulates an outage or timeout).
    TransportError,
}

#[derive(Default)]
struct InMemoryGatewayState {
    providers: Vec<ProviderStatus>,
    outcome: AuthorizeOutcome,
    next_id: u32,
    fail_on_capture: bool,
    fail_on_void: bool,
    fail_on_refund: bool,
    captures: Vec<(String, i64)>,
    refunds: Vec<(String, i64)>,
    voids: Vec<String>,
}

/// In-memory payment gateway for testing.
#[derive(Clone)]
pub struct InMemoryGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    /// Creates a gateway with a single enabled `stripe` provider.
    pub fn new() -> Self {
        let state = InMemoryGatewayState {
            providers: vec![ProviderStatus {
                provider: "stripe".into(),
                enabled: true,
            }],
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Forces the outcome of subsequent authorize calls.
    pub async fn set_authorize_outcome(&self, outcome: AuthorizeOutcome) {
        self.state.write().await.outcome = outcome;
    }

    /// Enables or disables a provider, adding it if unknown.
    pub async fn set_provider_enabled(&self, provider: &str, enabled: bool) {
        let mut state = self.state.write().await;
        match state.providers.iter_mut().find(|p| p.provider == provider) {
            Some(p) => p.enabled = enabled,
            None => state.providers.push(ProviderStatus {
                provider: provider.into(),
                enabled,
            }),
        }
    }

    /// Configures capture calls to fail.
    pub async fn set_fail_on_capture(&self, fail: bool) {
        self.state.write().await.fail_on_capture = fail;
    }

    /// Configures void calls to fail.
    pub async fn set_fail_on_void(&self, fail: bool) {
        self.state.write().await.fail_on_void = fail;
    }

    /// Configures refund calls to fail.
    pub async fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().await.fail_on_refund = fail;
    }

    /// Returns the captures the gateway has seen, in order.
    pub async fn captures(&self) -> Vec<(String, i64)> {
        self.state.read().await.captures.clone()
    }

    /// Returns the refunds the gateway has seen, in order.
    pub async fn refunds(&self) -> Vec<(String, i64)> {
        self.state.read().await.refunds.clone()
    }

    /// Returns the voided authorizations, in order.
    pub async fn voids(&self) -> Vec<String> {
        self.state.read().await.voids.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    async fn authorize(&self, request: PaymentRequest) -> Result<GatewayResponse> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let transaction_id = format!("PAY-{:04}", state.next_id);

        match &state.outcome {
            AuthorizeOutcome::Success => Ok(GatewayResponse {
                success: true,
                transaction_id,
                requires_action: false,
                action_url: None,
                error_message: None,
            }),
            AuthorizeOutcome::RequiresAction(url) => Ok(GatewayResponse {
                success: false,
                transaction_id,
                requires_action: true,
                action_url: Some(url.clone()),
                error_message: None,
            }),
            AuthorizeOutcome::Decline(message) => Ok(GatewayResponse {
                success: false,
                transaction_id,
                requires_action: false,
                action_url: None,
                error_message: Some(message.clone()),
            }),
            AuthorizeOutcome::TransportError => Err(Error::GatewayFailure(format!(
                "connection reset while authorizing order {}",
                request.order_id
            ))),
        }
    }

    async fn capture(&self, external_id: &str, amount: &Money, _provider: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_capture {
            return Err(Error::GatewayFailure("capture declined".into()));
        }
        state
            .captures
            .push((external_id.to_string(), amount.minor_units()));
        Ok(())
    }

    async fn void(&self, external_id: &str, _provider: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_void {
            return Err(Error::GatewayFailure("void declined".into()));
        }
        state.voids.push(external_id.to_string());
        Ok(())
    }

    async fn refund(&self, external_id: &str, amount: &Money, _provider: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_refund {
            return Err(Error::GatewayFailure("refund declined".into()));
        }
        state
            .refunds
            .push((external_id.to_string(), amount.minor_units()));
        Ok(())
    }

    async fn available_providers(&self) -> Result<Vec<ProviderStatus>> {
        Ok(self.state.read().await.providers.clone())
    }
}
