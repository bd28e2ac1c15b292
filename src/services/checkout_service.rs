use super::saga::{CompensatingAction, Saga};
use crate::config::BillingConfig;
use crate::database::{NewCompany, NewSubscription, PaymentUpsert, SubscriptionStore};
use crate::entities::{
    BillingMethod, PaymentStatus, SubscriptionStatus, company_entity, subscription_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{
    CardCredentials, CardHolderInfo, CustomerProfile, PaymentGateway, SubscriptionSpec,
};
use crate::models::{CheckoutRequest, CheckoutResponse, PixCharge};
use crate::utils::{require_text, sanitize_digits, validate_email, validate_tax_id};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
    trial_days: i64,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PaymentGateway>,
        billing: &BillingConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            trial_days: billing.trial_days,
        }
    }

    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> AppResult<CheckoutResponse> {
        self.checkout_at(user_id, request, Utc::now()).await
    }

    pub async fn checkout_at(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> AppResult<CheckoutResponse> {
        // 1. validate everything before touching the gateway
        let legal_name = require_text(&request.company.legal_name, "legal name")?.to_string();
        let tax_id = sanitize_digits(&request.company.tax_id);
        validate_tax_id(&tax_id)?;
        let email = request.company.email.trim().to_string();
        validate_email(&email)?;
        let phone = request
            .company
            .phone
            .as_deref()
            .map(sanitize_digits)
            .filter(|p| !p.is_empty());

        if request.billing_method == BillingMethod::CreditCard {
            if request.credit_card.is_none() {
                return Err(AppError::ValidationError(
                    "Credit card details are required".to_string(),
                ));
            }
            if request.address.is_none() {
                return Err(AppError::ValidationError(
                    "Postal code and address number are required for card payments".to_string(),
                ));
            }
        }

        let price = self
            .store
            .find_plan_price(&request.plan_id, request.cycle)
            .await?
            .ok_or_else(|| AppError::ValidationError("Invalid plan or cycle".to_string()))?;

        // 2. one company per owner, one live subscription per company
        let company = match self.store.find_company_by_owner(user_id).await? {
            Some(company) => company,
            None => {
                self.store
                    .insert_company(NewCompany {
                        owner_user_id: user_id,
                        legal_name,
                        tax_id,
                        email,
                        phone,
                        postal_code: request
                            .address
                            .as_ref()
                            .map(|a| sanitize_digits(&a.postal_code)),
                        address_number: request
                            .address
                            .as_ref()
                            .map(|a| a.address_number.trim().to_string()),
                    })
                    .await?
            }
        };
        if self
            .store
            .find_live_subscription_for_company(company.id)
            .await?
            .is_some()
        {
            return Err(AppError::ValidationError(
                "Company already has an active subscription".to_string(),
            ));
        }

        // 3. gateway customer
        let customer_id = self
            .gateway
            .create_or_get_customer(&CustomerProfile {
                name: company.legal_name.clone(),
                tax_id: company.tax_id.clone(),
                email: company.email.clone(),
                mobile_phone: company.phone.clone(),
                external_reference: company.id.to_string(),
            })
            .await?;

        // 4. gateway subscription, first due at the end of the trial
        let trial_end = now + Duration::days(self.trial_days);
        let card = match (&request.credit_card, request.billing_method) {
            (Some(card), BillingMethod::CreditCard) => Some(CardCredentials::Raw {
                card: card.clone(),
                holder: holder_info(&company, &request),
            }),
            _ => None,
        };
        let spec = SubscriptionSpec {
            customer_id: customer_id.clone(),
            billing_method: request.billing_method,
            value_cents: price.amount_cents,
            next_due_date: trial_end.date_naive(),
            cycle: request.cycle,
            description: format!("Plan {} ({})", request.plan_id, request.cycle),
            external_reference: format!("COMPANY_{}", company.id),
            card,
        };
        let created = self.gateway.create_subscription(&spec).await?;

        let mut saga = Saga::new("checkout", self.gateway.as_ref());
        saga.record(CompensatingAction::CancelExternalSubscription(
            created.id.clone(),
        ));

        // 5. local row
        let subscription = match self
            .store
            .insert_subscription(NewSubscription {
                company_id: company.id,
                plan_id: request.plan_id.clone(),
                cycle: request.cycle,
                billing_method: request.billing_method,
                status: SubscriptionStatus::Trialing,
                trial_ends_at: Some(trial_end),
                current_period_start: now,
                current_period_end: trial_end,
                access_until: trial_end,
                gateway_customer_id: customer_id,
                gateway_subscription_id: Some(created.id.clone()),
                card_token: created.card_token.clone(),
            })
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => return Err(saga.fail("persist_subscription", e).await),
        };
        saga.finish();

        log::info!(
            "Checkout completed: company {} subscription {} plan {}/{}",
            company.id,
            subscription.id,
            subscription.plan_id,
            subscription.cycle
        );

        // 6. instant payment code; the subscription already exists, so a
        // failure here only loses the code
        let pix = if request.billing_method.is_instant() {
            match self.attach_first_pending_charge(&subscription, &created.id).await {
                Ok(pix) => pix,
                Err(e) => {
                    log::warn!(
                        "Could not attach PIX code to subscription {}: {e}",
                        subscription.id
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(CheckoutResponse {
            subscription_id: subscription.id,
            status: subscription.status,
            access_until: subscription.access_until,
            pix,
        })
    }

    async fn attach_first_pending_charge(
        &self,
        subscription: &subscription_entity::Model,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<PixCharge>> {
        let payments = self
            .gateway
            .list_subscription_payments(gateway_subscription_id)
            .await?;
        let Some(pending) = payments.into_iter().find(|p| p.is_pending()) else {
            return Ok(None);
        };
        let code = self.gateway.get_instant_payment_code(&pending.id).await?;

        self.store
            .upsert_payment(PaymentUpsert {
                gateway_payment_id: pending.id.clone(),
                subscription_id: subscription.id,
                company_id: subscription.company_id,
                billing_method: BillingMethod::Pix,
                amount_cents: pending.value_cents,
                status: PaymentStatus::Pending,
                due_date: pending.due_date,
                paid_at: None,
                pix_qr_code: Some(code.encoded_image.clone()),
                pix_payload: Some(code.payload.clone()),
                invoice_url: pending.invoice_url.clone(),
            })
            .await?;

        Ok(Some(PixCharge {
            payment_id: pending.id,
            encoded_image: code.encoded_image,
            payload: code.payload,
            expiration_date: code.expiration_date,
        }))
    }
}

fn holder_info(company: &company_entity::Model, request: &CheckoutRequest) -> CardHolderInfo {
    let (postal_code, address_number) = match &request.address {
        Some(a) => (sanitize_digits(&a.postal_code), a.address_number.trim().to_string()),
        None => (
            company.postal_code.clone().unwrap_or_default(),
            company.address_number.clone().unwrap_or_default(),
        ),
    };
    CardHolderInfo {
        name: company.legal_name.clone(),
        email: company.email.clone(),
        tax_id: company.tax_id.clone(),
        postal_code,
        address_number,
        phone: company.phone.clone().unwrap_or_default(),
    }
}
