use async_trait::async_trait;
use billing_backend::external::{
    CardCredentials, ChargeSpec, CreatedSubscription, CustomerProfile, ExternalSubscription,
    GatewayError, GatewayPayment, InstantPaymentCode, PaymentGateway, SubscriptionSpec,
};
use std::sync::Mutex;

#[derive(Default)]
struct Script {
    next_id: u32,
    calls: Vec<String>,
    subscriptions: Vec<SubscriptionSpec>,
    charges: Vec<ChargeSpec>,
    fail_create_subscription: bool,
    fail_cancel_subscription: bool,
    charge_status: Option<String>,
    upstream_status: Option<String>,
    card_token: Option<String>,
}

/// Scripted `PaymentGateway` that records every call.
#[derive(Default)]
pub struct MockGateway {
    script: Mutex<Script>,
}

fn rejected(description: &str) -> GatewayError {
    GatewayError::Api {
        status: 400,
        description: description.to_string(),
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn created_subscriptions(&self) -> Vec<SubscriptionSpec> {
        self.script.lock().unwrap().subscriptions.clone()
    }

    pub fn charges(&self) -> Vec<ChargeSpec> {
        self.script.lock().unwrap().charges.clone()
    }

    pub fn fail_create_subscription(&self, fail: bool) {
        self.script.lock().unwrap().fail_create_subscription = fail;
    }

    pub fn fail_cancel_subscription(&self, fail: bool) {
        self.script.lock().unwrap().fail_cancel_subscription = fail;
    }

    /// Status returned for new charges; `PENDING` by default.
    pub fn set_charge_status(&self, status: &str) {
        self.script.lock().unwrap().charge_status = Some(status.to_string());
    }

    /// Status returned by `get_subscription`.
    pub fn set_upstream_status(&self, status: &str) {
        self.script.lock().unwrap().upstream_status = Some(status.to_string());
    }

    /// Token issued for raw card data.
    pub fn issue_card_token(&self, token: &str) {
        self.script.lock().unwrap().card_token = Some(token.to_string());
    }

    fn record(&self, call: String) -> u32 {
        let mut s = self.script.lock().unwrap();
        s.calls.push(call);
        s.next_id += 1;
        s.next_id
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_or_get_customer(
        &self,
        profile: &CustomerProfile,
    ) -> Result<String, GatewayError> {
        self.record(format!("create_or_get_customer:{}", profile.tax_id));
        Ok(format!("cus_{}", profile.tax_id))
    }

    async fn create_subscription(
        &self,
        spec: &SubscriptionSpec,
    ) -> Result<CreatedSubscription, GatewayError> {
        let n = self.record(format!("create_subscription:{}", spec.value_cents));
        let mut s = self.script.lock().unwrap();
        if s.fail_create_subscription {
            return Err(rejected("Cartão recusado"));
        }
        s.subscriptions.push(spec.clone());
        let card_token = match &spec.card {
            Some(CardCredentials::Raw { .. }) => s.card_token.clone(),
            _ => None,
        };
        Ok(CreatedSubscription {
            id: format!("sub_{n}"),
            card_token,
        })
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        self.record(format!("cancel_subscription:{subscription_id}"));
        if self.script.lock().unwrap().fail_cancel_subscription {
            return Err(GatewayError::Api {
                status: 404,
                description: "Subscription not found".to_string(),
            });
        }
        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ExternalSubscription, GatewayError> {
        self.record(format!("get_subscription:{subscription_id}"));
        let status = self
            .script
            .lock()
            .unwrap()
            .upstream_status
            .clone()
            .unwrap_or_else(|| "ACTIVE".to_string());
        Ok(ExternalSubscription {
            id: subscription_id.to_string(),
            status,
        })
    }

    async fn list_subscription_payments(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        self.record(format!("list_subscription_payments:{subscription_id}"));
        let s = self.script.lock().unwrap();
        let value_cents = s
            .subscriptions
            .last()
            .map(|spec| spec.value_cents)
            .unwrap_or_default();
        Ok(vec![GatewayPayment {
            id: format!("pay_{subscription_id}"),
            status: "PENDING".to_string(),
            value_cents,
            due_date: s.subscriptions.last().map(|spec| spec.next_due_date),
            invoice_url: Some(format!("https://invoice.test/{subscription_id}")),
            card_token: None,
        }])
    }

    async fn create_charge(&self, spec: &ChargeSpec) -> Result<GatewayPayment, GatewayError> {
        let n = self.record(format!("create_charge:{}", spec.value_cents));
        let mut s = self.script.lock().unwrap();
        s.charges.push(spec.clone());
        let card_token = match &spec.card {
            Some(CardCredentials::Raw { .. }) => s.card_token.clone(),
            _ => None,
        };
        Ok(GatewayPayment {
            id: format!("pay_{n}"),
            status: s.charge_status.clone().unwrap_or_else(|| "PENDING".to_string()),
            value_cents: spec.value_cents,
            due_date: Some(spec.due_date),
            invoice_url: None,
            card_token,
        })
    }

    async fn cancel_charge(&self, payment_id: &str) -> Result<(), GatewayError> {
        self.record(format!("cancel_charge:{payment_id}"));
        Ok(())
    }

    async fn get_instant_payment_code(
        &self,
        payment_id: &str,
    ) -> Result<InstantPaymentCode, GatewayError> {
        self.record(format!("get_instant_payment_code:{payment_id}"));
        Ok(InstantPaymentCode {
            encoded_image: format!("iVBORw0KGgo-{payment_id}"),
            payload: format!("00020126-{payment_id}"),
            expiration_date: Some("2099-12-31 23:59:59".to_string()),
        })
    }
}
