//! Persistence seam for the billing orchestrators.
//!
//! Every write path goes through [`SubscriptionStore`]. Subscription rows are
//! updated with an optimistic version check; a stale writer gets
//! [`AppError::ConcurrentModification`](crate::error::AppError) instead of
//! overwriting a newer row.

use crate::entities::{
    BillingCycle, BillingMethod, ChangeStatus, ChangeType, PaymentStatus, SubscriptionStatus,
    company_entity, payment_entity, plan_price_entity, subscription_change_entity,
    subscription_entity,
};
use crate::error::AppResult;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewCompany {
    pub owner_user_id: Uuid,
    pub legal_name: String,
    pub tax_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub address_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
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
}

/// Partial update of a subscription row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub plan_id: Option<String>,
    pub cycle: Option<BillingCycle>,
    pub billing_method: Option<BillingMethod>,
    pub status: Option<SubscriptionStatus>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub access_until: Option<DateTime<Utc>>,
    pub gateway_subscription_id: Option<String>,
    pub card_token: Option<String>,
    pub cancel_at_period_end: Option<bool>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_gateway_event_at: Option<DateTime<Utc>>,
}

impl SubscriptionPatch {
    /// Applies the patch to an in-memory row. Used by stores that do not
    /// translate patches into SQL.
    pub fn apply_to(&self, row: &mut subscription_entity::Model) {
        if let Some(v) = &self.plan_id {
            row.plan_id = v.clone();
        }
        if let Some(v) = self.cycle {
            row.cycle = v;
        }
        if let Some(v) = self.billing_method {
            row.billing_method = v;
        }
        if let Some(v) = self.status {
            row.status = v;
        }
        if let Some(v) = self.current_period_start {
            row.current_period_start = v;
        }
        if let Some(v) = self.current_period_end {
            row.current_period_end = v;
        }
        if let Some(v) = self.access_until {
            row.access_until = v;
        }
        if let Some(v) = &self.gateway_subscription_id {
            row.gateway_subscription_id = Some(v.clone());
        }
        if let Some(v) = &self.card_token {
            row.card_token = Some(v.clone());
        }
        if let Some(v) = self.cancel_at_period_end {
            row.cancel_at_period_end = v;
        }
        if let Some(v) = self.canceled_at {
            row.canceled_at = Some(v);
        }
        if let Some(v) = self.last_synced_at {
            row.last_synced_at = Some(v);
        }
        if let Some(v) = self.last_gateway_event_at {
            row.last_gateway_event_at = Some(v);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscriptionChange {
    pub subscription_id: i64,
    pub company_id: i64,
    pub change_type: ChangeType,
    pub to_plan_id: String,
    pub to_cycle: BillingCycle,
    pub billing_method: BillingMethod,
    pub proration_cents: Option<i64>,
    pub effective_at: DateTime<Utc>,
    pub status: ChangeStatus,
    pub gateway_payment_id: Option<String>,
    pub card_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentUpsert {
    pub gateway_payment_id: String,
    pub subscription_id: i64,
    pub company_id: i64,
    pub billing_method: BillingMethod,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    pub due_date: Option<NaiveDate>,
    pub paid_at: Option<DateTime<Utc>>,
    pub pix_qr_code: Option<String>,
    pub pix_payload: Option<String>,
    pub invoice_url: Option<String>,
}

impl PaymentUpsert {
    /// Merges this upsert into an existing row, keeping stored optional
    /// fields the incoming record does not carry.
    pub fn merge_into(&self, row: &mut payment_entity::Model) {
        row.status = self.status;
        row.amount_cents = self.amount_cents;
        if self.due_date.is_some() {
            row.due_date = self.due_date;
        }
        if self.paid_at.is_some() {
            row.paid_at = self.paid_at;
        }
        if self.pix_qr_code.is_some() {
            row.pix_qr_code = self.pix_qr_code.clone();
        }
        if self.pix_payload.is_some() {
            row.pix_payload = self.pix_payload.clone();
        }
        if self.invoice_url.is_some() {
            row.invoice_url = self.invoice_url.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewGatewayEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    // companies
    async fn find_company(&self, id: i64) -> AppResult<Option<company_entity::Model>>;
    async fn find_company_by_owner(
        &self,
        owner_user_id: Uuid,
    ) -> AppResult<Option<company_entity::Model>>;
    async fn insert_company(&self, company: NewCompany) -> AppResult<company_entity::Model>;

    // plan catalog
    async fn find_plan_price(
        &self,
        plan_id: &str,
        cycle: BillingCycle,
    ) -> AppResult<Option<plan_price_entity::Model>>;
    async fn list_plan_prices(&self) -> AppResult<Vec<plan_price_entity::Model>>;

    // subscriptions
    async fn insert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> AppResult<subscription_entity::Model>;
    async fn find_subscription(&self, id: i64) -> AppResult<Option<subscription_entity::Model>>;
    async fn find_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<subscription_entity::Model>>;
    async fn find_live_subscription_for_company(
        &self,
        company_id: i64,
    ) -> AppResult<Option<subscription_entity::Model>>;
    /// Applies `patch` only if the row still has `expected_version`; the
    /// returned row carries the bumped version.
    async fn update_subscription(
        &self,
        id: i64,
        expected_version: i32,
        patch: SubscriptionPatch,
    ) -> AppResult<subscription_entity::Model>;
    /// `cancel_requested` rows whose paid access has ended.
    async fn list_cancellations_due(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<subscription_entity::Model>>;

    // subscription changes
    async fn insert_change(
        &self,
        change: NewSubscriptionChange,
    ) -> AppResult<subscription_change_entity::Model>;
    async fn find_change_by_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<subscription_change_entity::Model>>;
    async fn find_open_changes(
        &self,
        subscription_id: i64,
    ) -> AppResult<Vec<subscription_change_entity::Model>>;
    /// `scheduled` changes with `effective_at <= now`, oldest first.
    async fn list_due_changes(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<subscription_change_entity::Model>>;
    /// Moves a change from `from` to `to`. Returns false when the change is
    /// no longer in `from` (someone else claimed or finished it).
    async fn transition_change(
        &self,
        id: i64,
        from: ChangeStatus,
        to: ChangeStatus,
        failure_reason: Option<String>,
        processed_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool>;

    // payments
    async fn upsert_payment(&self, payment: PaymentUpsert) -> AppResult<payment_entity::Model>;
    async fn find_payment(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<payment_entity::Model>>;
    /// Returns false when no payment row with that gateway id exists.
    async fn update_payment_status(
        &self,
        gateway_payment_id: &str,
        status: PaymentStatus,
    ) -> AppResult<bool>;

    /// Marks a payment confirmed unless it already is. Returns true only
    /// for the caller that performed the flip.
    async fn confirm_payment(
        &self,
        gateway_payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    // idempotency log
    async fn gateway_event_exists(&self, event_id: &str) -> AppResult<bool>;
    /// Inserts the event unless its id is already logged. Returns false on a
    /// duplicate.
    async fn record_gateway_event(&self, event: NewGatewayEvent) -> AppResult<bool>;
    /// Forgets a logged event so a redelivery is applied again.
    async fn release_gateway_event(&self, event_id: &str) -> AppResult<()>;
}
