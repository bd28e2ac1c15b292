use super::BillingCycle;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "billing_method")]
#[serde(rename_all = "snake_case")]
pub enum BillingMethod {
    #[sea_orm(string_value = "pix")]
    Pix,
    #[sea_orm(string_value = "credit_card")]
    CreditCard,
}

impl BillingMethod {
    pub fn gateway_billing_type(self) -> &'static str {
        match self {
            BillingMethod::Pix => "PIX",
            BillingMethod::CreditCard => "CREDIT_CARD",
        }
    }

    /// Instant methods produce a displayable payment code instead of charging stored credentials.
    pub fn is_instant(self) -> bool {
        matches!(self, BillingMethod::Pix)
    }
}

impl std::fmt::Display for BillingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingMethod::Pix => write!(f, "pix"),
            BillingMethod::CreditCard => write!(f, "credit_card"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "subscription_status")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[sea_orm(string_value = "trialing")]
    Trialing,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "cancel_requested")]
    CancelRequested,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl SubscriptionStatus {
    /// Whether the state machine allows moving from `self` to `next`.
    /// Staying in the same non-terminal state is always allowed.
    pub fn can_transition_to(self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        match (self, next) {
            (Canceled, _) => false,
            (CancelRequested, Canceled) => true,
            (CancelRequested, _) => next == CancelRequested,
            (_, Trialing) => self == Trialing,
            (Trialing | Active | Overdue, _) => true,
        }
    }

    pub fn is_live(self) -> bool {
        self != SubscriptionStatus::Canceled
    }

    /// Plan changes are refused once cancellation has started.
    pub fn accepts_plan_changes(self) -> bool {
        !matches!(
            self,
            SubscriptionStatus::CancelRequested | SubscriptionStatus::Canceled
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionStatus::Trialing => write!(f, "trialing"),
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Overdue => write!(f, "overdue"),
            SubscriptionStatus::CancelRequested => write!(f, "cancel_requested"),
            SubscriptionStatus::Canceled => write!(f, "canceled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
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
    pub gateway_customer_id: String,
    pub gateway_subscription_id: Option<String>,
    pub card_token: Option<String>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_gateway_event_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every update.
    pub version: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
