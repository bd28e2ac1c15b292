//! Asaas webhook payloads and their typed form.

use super::asaas::value_to_cents;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub payment: Option<WebhookPayment>,
    #[serde(default)]
    pub subscription: Option<WebhookSubscriptionRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayment {
    pub id: String,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub payment_date: Option<String>,
    #[serde(default)]
    pub confirmed_date: Option<String>,
    #[serde(default)]
    pub invoice_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscriptionRef {
    pub id: String,
}

/// Payment data carried by a payment event, normalized to local units.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub payment_id: String,
    pub gateway_subscription_id: Option<String>,
    pub value_cents: Option<i64>,
    pub billing_type: Option<String>,
    pub due_date: Option<NaiveDate>,
    /// Settlement date reported by the gateway (`paymentDate`, then `confirmedDate`).
    pub paid_on: Option<NaiveDate>,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    PaymentConfirmed(PaymentEvent),
    PaymentOverdue(PaymentEvent),
    PaymentRefunded(PaymentEvent),
    Unknown(String),
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|d| NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").ok())
}

impl WebhookPayload {
    /// Deterministic id used by the idempotency log: `{paymentId}_{EVENT}`,
    /// falling back to the subscription id for events without a payment.
    pub fn event_id(&self) -> Option<String> {
        let subject = self
            .payment
            .as_ref()
            .map(|p| p.id.as_str())
            .or_else(|| self.subscription.as_ref().map(|s| s.id.as_str()))?;
        Some(format!("{subject}_{}", self.event))
    }

    pub fn to_event(&self) -> GatewayEvent {
        let Some(payment) = &self.payment else {
            return GatewayEvent::Unknown(self.event.clone());
        };
        let data = PaymentEvent {
            payment_id: payment.id.clone(),
            gateway_subscription_id: payment
                .subscription
                .clone()
                .or_else(|| self.subscription.as_ref().map(|s| s.id.clone())),
            value_cents: payment.value.map(value_to_cents),
            billing_type: payment.billing_type.clone(),
            due_date: parse_date(payment.due_date.as_deref()),
            paid_on: parse_date(payment.payment_date.as_deref())
                .or_else(|| parse_date(payment.confirmed_date.as_deref())),
            invoice_url: payment.invoice_url.clone(),
        };
        match self.event.as_str() {
            "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED" => GatewayEvent::PaymentConfirmed(data),
            "PAYMENT_OVERDUE" => GatewayEvent::PaymentOverdue(data),
            "PAYMENT_REFUNDED" => GatewayEvent::PaymentRefunded(data),
            other => GatewayEvent::Unknown(other.to_string()),
        }
    }
}
