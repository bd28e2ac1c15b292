use crate::entities::{
    BillingCycle, BillingMethod, ChangeStatus, SubscriptionStatus, plan_price_entity,
    subscription_entity,
};
use crate::external::CreditCard;
use crate::services::saga::CompensationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompanyInput {
    #[schema(example = "ACME Software LTDA")]
    pub legal_name: String,
    /// CPF (11 digits) or CNPJ (14 digits); punctuation is ignored.
    #[serde(alias = "cpf_cnpj")]
    #[schema(example = "11.222.333/0001-81")]
    pub tax_id: String,
    #[schema(example = "billing@acme.com.br")]
    pub email: String,
    #[serde(default, alias = "whatsapp")]
    #[schema(example = "+55 11 99999-0000")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressInput {
    #[schema(example = "01001-000")]
    pub postal_code: String,
    #[schema(example = "100")]
    pub address_number: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub company: CompanyInput,
    #[serde(default)]
    pub address: Option<AddressInput>,
    #[schema(example = "pro")]
    pub plan_id: String,
    pub cycle: BillingCycle,
    #[serde(alias = "billing_type")]
    pub billing_method: BillingMethod,
    #[serde(default)]
    pub credit_card: Option<CreditCard>,
}

/// Instant-payment (PIX) code for a pending charge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PixCharge {
    pub payment_id: String,
    pub encoded_image: String,
    pub payload: String,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub subscription_id: i64,
    pub status: SubscriptionStatus,
    pub access_until: DateTime<Utc>,
    pub pix: Option<PixCharge>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpgradeRequest {
    pub subscription_id: i64,
    #[schema(example = "business")]
    pub to_plan_id: String,
    pub to_cycle: BillingCycle,
    #[serde(alias = "billing_type")]
    pub billing_method: BillingMethod,
    #[serde(default)]
    pub credit_card: Option<CreditCard>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpgradeResponse {
    pub change_id: i64,
    pub status: ChangeStatus,
    /// Prorated amount charged now, in cents.
    pub proration_cents: i64,
    pub payment_id: Option<String>,
    pub pix: Option<PixCharge>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub compensations: Vec<CompensationResult>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScheduleDowngradeRequest {
    pub subscription_id: i64,
    pub to_plan_id: String,
    pub to_cycle: BillingCycle,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScheduleDowngradeResponse {
    pub change_id: i64,
    pub status: ChangeStatus,
    pub effective_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub subscription_id: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelResponse {
    pub subscription_id: i64,
    pub status: SubscriptionStatus,
    pub access_until: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub compensations: Vec<CompensationResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncStatusResponse {
    pub subscription_id: i64,
    pub status: SubscriptionStatus,
    /// Raw status reported by the gateway.
    pub upstream_status: String,
    pub changed: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: i64,
    pub company_id: i64,
    pub plan_id: String,
    pub cycle: BillingCycle,
    pub billing_method: BillingMethod,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub access_until: DateTime<Utc>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<subscription_entity::Model> for SubscriptionResponse {
    fn from(s: subscription_entity::Model) -> Self {
        Self {
            id: s.id,
            company_id: s.company_id,
            plan_id: s.plan_id,
            cycle: s.cycle,
            billing_method: s.billing_method,
            status: s.status,
            trial_ends_at: s.trial_ends_at,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            access_until: s.access_until,
            cancel_at_period_end: s.cancel_at_period_end,
            canceled_at: s.canceled_at,
            last_synced_at: s.last_synced_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlanPriceResponse {
    pub plan_id: String,
    pub cycle: BillingCycle,
    pub amount_cents: i64,
}

impl From<plan_price_entity::Model> for PlanPriceResponse {
    fn from(p: plan_price_entity::Model) -> Self {
        Self {
            plan_id: p.plan_id,
            cycle: p.cycle,
            amount_cents: p.amount_cents,
        }
    }
}

/// Result of one scheduled change in a processor run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ChangeOutcome {
    pub change_id: i64,
    pub status: ChangeStatus,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub compensations: Vec<CompensationResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessScheduledChangesResponse {
    pub processed: usize,
    pub results: Vec<ChangeOutcome>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    pub fn processed() -> Self {
        Self {
            received: true,
            duplicate: false,
            error: None,
        }
    }

    pub fn duplicate() -> Self {
        Self {
            received: true,
            duplicate: true,
            error: None,
        }
    }

    pub fn failed(message: String) -> Self {
        Self {
            received: true,
            duplicate: false,
            error: Some(message),
        }
    }
}
