use async_trait::async_trait;
use billing_backend::database::{
    NewCompany, NewGatewayEvent, NewSubscription, NewSubscriptionChange, PaymentUpsert,
    SubscriptionPatch, SubscriptionStore,
};
use billing_backend::entities::{
    BillingCycle, ChangeStatus, PaymentStatus, SubscriptionStatus, company_entity,
    gateway_event_entity, payment_entity, plan_price_entity, subscription_change_entity,
    subscription_entity,
};
use billing_backend::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    next_id: i64,
    companies: Vec<company_entity::Model>,
    plan_prices: Vec<plan_price_entity::Model>,
    subscriptions: Vec<subscription_entity::Model>,
    changes: Vec<subscription_change_entity::Model>,
    payments: Vec<payment_entity::Model>,
    events: Vec<gateway_event_entity::Model>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// `SubscriptionStore` backed by vectors, with the same version and
/// uniqueness rules as the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_subscription_writes: AtomicBool,
    conflicting_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_price(&self, plan_id: &str, cycle: BillingCycle, amount_cents: i64) {
        let mut t = self.tables.lock().unwrap();
        let id = t.id();
        t.plan_prices.push(plan_price_entity::Model {
            id,
            plan_id: plan_id.to_string(),
            cycle,
            amount_cents,
            created_at: None,
        });
    }

    /// Makes every subscription insert/update fail with a database error.
    pub fn fail_subscription_writes(&self, fail: bool) {
        self.fail_subscription_writes.store(fail, Ordering::SeqCst);
    }

    /// The next `n` subscription updates find the row moved on by another
    /// writer: its version is bumped and the update is rejected.
    pub fn conflict_subscription_writes(&self, n: usize) {
        self.conflicting_writes.store(n, Ordering::SeqCst);
    }

    pub fn subscription(&self, id: i64) -> subscription_entity::Model {
        let t = self.tables.lock().unwrap();
        t.subscriptions.iter().find(|s| s.id == id).cloned().unwrap()
    }

    pub fn subscriptions(&self) -> Vec<subscription_entity::Model> {
        self.tables.lock().unwrap().subscriptions.clone()
    }

    pub fn change(&self, id: i64) -> subscription_change_entity::Model {
        let t = self.tables.lock().unwrap();
        t.changes.iter().find(|c| c.id == id).cloned().unwrap()
    }

    pub fn payments(&self) -> Vec<payment_entity::Model> {
        self.tables.lock().unwrap().payments.clone()
    }

    pub fn event_count(&self) -> usize {
        self.tables.lock().unwrap().events.len()
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_subscription_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(sea_orm::DbErr::Custom(
                "subscriptions table unavailable".to_string(),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn find_company(&self, id: i64) -> AppResult<Option<company_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t.companies.iter().find(|c| c.id == id).cloned())
    }

    async fn find_company_by_owner(
        &self,
        owner_user_id: Uuid,
    ) -> AppResult<Option<company_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .companies
            .iter()
            .find(|c| c.owner_user_id == owner_user_id)
            .cloned())
    }

    async fn insert_company(&self, company: NewCompany) -> AppResult<company_entity::Model> {
        let mut t = self.tables.lock().unwrap();
        if t
            .companies
            .iter()
            .any(|c| c.owner_user_id == company.owner_user_id)
        {
            return Err(AppError::ConcurrentModification(
                "company already exists for owner".to_string(),
            ));
        }
        let id = t.id();
        let row = company_entity::Model {
            id,
            owner_user_id: company.owner_user_id,
            legal_name: company.legal_name,
            tax_id: company.tax_id,
            email: company.email,
            phone: company.phone,
            postal_code: company.postal_code,
            address_number: company.address_number,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        };
        t.companies.push(row.clone());
        Ok(row)
    }

    async fn find_plan_price(
        &self,
        plan_id: &str,
        cycle: BillingCycle,
    ) -> AppResult<Option<plan_price_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .plan_prices
            .iter()
            .find(|p| p.plan_id == plan_id && p.cycle == cycle)
            .cloned())
    }

    async fn list_plan_prices(&self) -> AppResult<Vec<plan_price_entity::Model>> {
        Ok(self.tables.lock().unwrap().plan_prices.clone())
    }

    async fn insert_subscription(
        &self,
        s: NewSubscription,
    ) -> AppResult<subscription_entity::Model> {
        self.check_writable()?;
        let mut t = self.tables.lock().unwrap();
        if t
            .subscriptions
            .iter()
            .any(|row| row.company_id == s.company_id && row.status.is_live())
        {
            return Err(AppError::ConcurrentModification(
                "company already has a live subscription".to_string(),
            ));
        }
        let id = t.id();
        let row = subscription_entity::Model {
            id,
            company_id: s.company_id,
            plan_id: s.plan_id,
            cycle: s.cycle,
            billing_method: s.billing_method,
            status: s.status,
            trial_ends_at: s.trial_ends_at,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            access_until: s.access_until,
            gateway_customer_id: s.gateway_customer_id,
            gateway_subscription_id: s.gateway_subscription_id,
            card_token: s.card_token,
            cancel_at_period_end: false,
            canceled_at: None,
            last_synced_at: None,
            last_gateway_event_at: None,
            version: 1,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        };
        t.subscriptions.push(row.clone());
        Ok(row)
    }

    async fn find_subscription(&self, id: i64) -> AppResult<Option<subscription_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<subscription_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .subscriptions
            .iter()
            .find(|s| s.gateway_subscription_id.as_deref() == Some(gateway_subscription_id))
            .cloned())
    }

    async fn find_live_subscription_for_company(
        &self,
        company_id: i64,
    ) -> AppResult<Option<subscription_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .subscriptions
            .iter()
            .find(|s| s.company_id == company_id && s.status.is_live())
            .cloned())
    }

    async fn update_subscription(
        &self,
        id: i64,
        expected_version: i32,
        patch: SubscriptionPatch,
    ) -> AppResult<subscription_entity::Model> {
        self.check_writable()?;
        let mut t = self.tables.lock().unwrap();
        let row = t
            .subscriptions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Subscription {id} not found")))?;
        let concurrent = self
            .conflicting_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if concurrent {
            row.version += 1;
        }
        if row.version != expected_version {
            return Err(AppError::ConcurrentModification(format!(
                "subscription {id} is at version {}, expected {expected_version}",
                row.version
            )));
        }
        patch.apply_to(row);
        row.version += 1;
        row.updated_at = Some(Utc::now());
        Ok(row.clone())
    }

    async fn list_cancellations_due(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<subscription_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .subscriptions
            .iter()
            .filter(|s| s.status == SubscriptionStatus::CancelRequested && s.access_until <= now)
            .cloned()
            .collect())
    }

    async fn insert_change(
        &self,
        c: NewSubscriptionChange,
    ) -> AppResult<subscription_change_entity::Model> {
        let mut t = self.tables.lock().unwrap();
        let id = t.id();
        let row = subscription_change_entity::Model {
            id,
            subscription_id: c.subscription_id,
            company_id: c.company_id,
            change_type: c.change_type,
            to_plan_id: c.to_plan_id,
            to_cycle: c.to_cycle,
            billing_method: c.billing_method,
            proration_cents: c.proration_cents,
            effective_at: c.effective_at,
            status: c.status,
            gateway_payment_id: c.gateway_payment_id,
            card_token: c.card_token,
            failure_reason: None,
            processed_at: None,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        };
        t.changes.push(row.clone());
        Ok(row)
    }

    async fn find_change_by_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<subscription_change_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .changes
            .iter()
            .find(|c| c.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .cloned())
    }

    async fn find_open_changes(
        &self,
        subscription_id: i64,
    ) -> AppResult<Vec<subscription_change_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .changes
            .iter()
            .filter(|c| c.subscription_id == subscription_id && c.status.is_open())
            .cloned()
            .collect())
    }

    async fn list_due_changes(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<subscription_change_entity::Model>> {
        let t = self.tables.lock().unwrap();
        let mut due: Vec<_> = t
            .changes
            .iter()
            .filter(|c| c.status == ChangeStatus::Scheduled && c.effective_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| (c.effective_at, c.id));
        Ok(due)
    }

    async fn transition_change(
        &self,
        id: i64,
        from: ChangeStatus,
        to: ChangeStatus,
        failure_reason: Option<String>,
        processed_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut t = self.tables.lock().unwrap();
        let Some(row) = t.changes.iter_mut().find(|c| c.id == id && c.status == from) else {
            return Ok(false);
        };
        row.status = to;
        if failure_reason.is_some() {
            row.failure_reason = failure_reason;
        }
        if processed_at.is_some() {
            row.processed_at = processed_at;
        }
        row.updated_at = Some(Utc::now());
        Ok(true)
    }

    async fn upsert_payment(&self, p: PaymentUpsert) -> AppResult<payment_entity::Model> {
        let mut t = self.tables.lock().unwrap();
        if let Some(row) = t
            .payments
            .iter_mut()
            .find(|row| row.gateway_payment_id == p.gateway_payment_id)
        {
            p.merge_into(row);
            row.updated_at = Some(Utc::now());
            return Ok(row.clone());
        }
        let id = t.id();
        let row = payment_entity::Model {
            id,
            gateway_payment_id: p.gateway_payment_id,
            subscription_id: p.subscription_id,
            company_id: p.company_id,
            billing_method: p.billing_method,
            amount_cents: p.amount_cents,
            status: p.status,
            due_date: p.due_date,
            paid_at: p.paid_at,
            pix_qr_code: p.pix_qr_code,
            pix_payload: p.pix_payload,
            invoice_url: p.invoice_url,
            created_at: Some(Utc::now()),
            updated_at: Some(Utc::now()),
        };
        t.payments.push(row.clone());
        Ok(row)
    }

    async fn find_payment(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<payment_entity::Model>> {
        let t = self.tables.lock().unwrap();
        Ok(t
            .payments
            .iter()
            .find(|p| p.gateway_payment_id == gateway_payment_id)
            .cloned())
    }

    async fn update_payment_status(
        &self,
        gateway_payment_id: &str,
        status: PaymentStatus,
    ) -> AppResult<bool> {
        let mut t = self.tables.lock().unwrap();
        match t
            .payments
            .iter_mut()
            .find(|p| p.gateway_payment_id == gateway_payment_id)
        {
            Some(row) => {
                row.status = status;
                row.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn confirm_payment(
        &self,
        gateway_payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut t = self.tables.lock().unwrap();
        match t.payments.iter_mut().find(|p| {
            p.gateway_payment_id == gateway_payment_id && p.status != PaymentStatus::Confirmed
        }) {
            Some(row) => {
                row.status = PaymentStatus::Confirmed;
                row.paid_at = Some(paid_at);
                row.updated_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn gateway_event_exists(&self, event_id: &str) -> AppResult<bool> {
        let t = self.tables.lock().unwrap();
        Ok(t.events.iter().any(|e| e.event_id == event_id))
    }

    async fn record_gateway_event(&self, event: NewGatewayEvent) -> AppResult<bool> {
        let mut t = self.tables.lock().unwrap();
        if t.events.iter().any(|e| e.event_id == event.event_id) {
            return Ok(false);
        }
        let id = t.id();
        t.events.push(gateway_event_entity::Model {
            id,
            event_id: event.event_id,
            event_type: event.event_type,
            payload: event.payload,
            received_at: Utc::now(),
        });
        Ok(true)
    }

    async fn release_gateway_event(&self, event_id: &str) -> AppResult<()> {
        self.tables
            .lock()
            .unwrap()
            .events
            .retain(|e| e.event_id != event_id);
        Ok(())
    }
}
