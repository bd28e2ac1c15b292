#![allow(dead_code)]

pub mod memory_store;
pub mod mock_gateway;

use billing_backend::config::BillingConfig;
use billing_backend::database::{NewCompany, NewSubscription, SubscriptionStore};
use billing_backend::entities::{
    BillingCycle, BillingMethod, SubscriptionStatus, company_entity, subscription_entity,
};
use billing_backend::services::*;
use chrono::{DateTime, TimeZone, Utc};
pub use memory_store::MemoryStore;
pub use mock_gateway::MockGateway;
use std::sync::Arc;
use uuid::Uuid;

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
}

impl Fixture {
    /// Catalog: basic 50.00/mo, pro 90.00/mo, pro 480.00/semester, basic 500.00/yr.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        store.seed_price("basic", BillingCycle::Monthly, 5000);
        store.seed_price("pro", BillingCycle::Monthly, 9000);
        store.seed_price("pro", BillingCycle::Semiannual, 48000);
        store.seed_price("basic", BillingCycle::Yearly, 50000);
        Self {
            store,
            gateway: Arc::new(MockGateway::new()),
        }
    }

    fn store_dyn(&self) -> Arc<dyn SubscriptionStore> {
        self.store.clone()
    }

    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(
            self.store_dyn(),
            self.gateway.clone(),
            &BillingConfig { trial_days: 7 },
        )
    }

    pub fn upgrade(&self) -> UpgradeService {
        UpgradeService::new(self.store_dyn(), self.gateway.clone())
    }

    pub fn downgrade(&self) -> DowngradeService {
        DowngradeService::new(self.store_dyn())
    }

    pub fn processor(&self) -> ScheduledChangeService {
        ScheduledChangeService::new(self.store_dyn(), self.gateway.clone())
    }

    pub fn cancellation(&self) -> CancellationService {
        CancellationService::new(self.store_dyn(), self.gateway.clone())
    }

    pub fn sync(&self) -> StatusSyncService {
        StatusSyncService::new(self.store_dyn(), self.gateway.clone())
    }

    pub fn webhook(&self, token: &str) -> WebhookService {
        WebhookService::new(self.store_dyn(), self.gateway.clone(), token.to_string())
    }

    /// A company owned by a fresh user, already past checkout.
    pub async fn subscribed(
        &self,
        plan_id: &str,
        cycle: BillingCycle,
        method: BillingMethod,
        status: SubscriptionStatus,
        period: (DateTime<Utc>, DateTime<Utc>),
    ) -> (Uuid, company_entity::Model, subscription_entity::Model) {
        let owner = Uuid::new_v4();
        let company = self
            .store
            .insert_company(NewCompany {
                owner_user_id: owner,
                legal_name: "ACME Software LTDA".to_string(),
                tax_id: "11222333000181".to_string(),
                email: "billing@acme.com.br".to_string(),
                phone: None,
                postal_code: Some("01001000".to_string()),
                address_number: Some("100".to_string()),
            })
            .await
            .unwrap();
        let subscription = self
            .store
            .insert_subscription(NewSubscription {
                company_id: company.id,
                plan_id: plan_id.to_string(),
                cycle,
                billing_method: method,
                status,
                trial_ends_at: None,
                current_period_start: period.0,
                current_period_end: period.1,
                access_until: period.1,
                gateway_customer_id: "cus_acme".to_string(),
                gateway_subscription_id: Some(format!("sub_old_{}", company.id)),
                card_token: (method == BillingMethod::CreditCard).then(|| "tok_stored".to_string()),
            })
            .await
            .unwrap();
        (owner, company, subscription)
    }
}
