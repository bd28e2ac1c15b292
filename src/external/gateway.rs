//! Boundary types for the external payment gateway.
//!
//! Amounts cross this boundary as integer cents; only the concrete client
//! converts them to the gateway's decimal representation.

use crate::entities::{BillingCycle, BillingMethod};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway returned {status}: {description}")]
    Api { status: u16, description: String },

    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// The gateway rejected the request itself (bad card, invalid data).
    pub fn is_client_error(&self) -> bool {
        matches!(self, GatewayError::Api { status, .. } if (400..500).contains(status))
    }

    /// Message safe to show to the caller.
    pub fn user_message(&self) -> &str {
        match self {
            GatewayError::Api { description, .. } => description,
            GatewayError::Transport(_) => "Payment gateway unavailable",
            GatewayError::Decode(_) => "Unexpected response from payment gateway",
        }
    }
}

/// Raw card data as typed by the customer. Never logged.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreditCard {
    pub holder_name: String,
    pub number: String,
    pub expiry_month: String,
    pub expiry_year: String,
    pub ccv: String,
}

impl std::fmt::Debug for CreditCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last4: String = self
            .number
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        f.debug_struct("CreditCard")
            .field("holder_name", &self.holder_name)
            .field("number", &format_args!("****{last4}"))
            .field("ccv", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CardHolderInfo {
    pub name: String,
    pub email: String,
    pub tax_id: String,
    pub postal_code: String,
    pub address_number: String,
    pub phone: String,
}

/// How a card-billed request authorizes payment.
#[derive(Debug, Clone)]
pub enum CardCredentials {
    Raw {
        card: CreditCard,
        holder: CardHolderInfo,
    },
    Token(String),
}

#[derive(Debug, Clone)]
pub struct CustomerProfile {
    pub name: String,
    pub tax_id: String,
    pub email: String,
    pub mobile_phone: Option<String>,
    pub external_reference: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    pub customer_id: String,
    pub billing_method: BillingMethod,
    pub value_cents: i64,
    pub next_due_date: NaiveDate,
    pub cycle: BillingCycle,
    pub description: String,
    pub external_reference: String,
    pub card: Option<CardCredentials>,
}

#[derive(Debug, Clone)]
pub struct ChargeSpec {
    pub customer_id: String,
    pub billing_method: BillingMethod,
    pub value_cents: i64,
    pub due_date: NaiveDate,
    pub description: String,
    pub external_reference: String,
    pub card: Option<CardCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSubscription {
    pub id: String,
    /// Present when the gateway tokenized the card used for this subscription.
    pub card_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSubscription {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayPayment {
    pub id: String,
    pub status: String,
    pub value_cents: i64,
    pub due_date: Option<NaiveDate>,
    pub invoice_url: Option<String>,
    pub card_token: Option<String>,
}

impl GatewayPayment {
    pub fn is_pending(&self) -> bool {
        self.status == "PENDING"
    }

    /// Card charges can come back already captured.
    pub fn is_settled(&self) -> bool {
        matches!(self.status.as_str(), "CONFIRMED" | "RECEIVED")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct InstantPaymentCode {
    pub encoded_image: String,
    pub payload: String,
    pub expiration_date: Option<String>,
}

/// Request/response client for the payment gateway. Implementations perform
/// no retries; `create_subscription` and `create_charge` are not idempotent
/// upstream.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Looks the customer up by tax id before creating one.
    async fn create_or_get_customer(
        &self,
        profile: &CustomerProfile,
    ) -> Result<String, GatewayError>;

    async fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Result<CreatedSubscription, GatewayError>;

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ExternalSubscription, GatewayError>;

    async fn list_subscription_payments(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError>;

    async fn create_charge(&self, spec: &ChargeSpec) -> Result<GatewayPayment, GatewayError>;

    async fn cancel_charge(&self, payment_id: &str) -> Result<(), GatewayError>;

    async fn get_instant_payment_code(
        &self,
        payment_id: &str,
    ) -> Result<InstantPaymentCode, GatewayError>;
}
