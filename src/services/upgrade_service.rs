use super::ownership::load_owned_subscription;
use super::plan_swap::complete_change;
use super::proration;
use super::saga::{CompensatingAction, Saga};
use crate::database::{NewSubscriptionChange, PaymentUpsert, SubscriptionStore};
use crate::entities::{
    BillingMethod, ChangeStatus, ChangeType, PaymentStatus, company_entity, subscription_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{CardCredentials, CardHolderInfo, ChargeSpec, CreditCard, PaymentGateway};
use crate::models::{PixCharge, UpgradeRequest, UpgradeResponse};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct UpgradeService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl UpgradeService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn upgrade(&self, user_id: Uuid, request: UpgradeRequest) -> AppResult<UpgradeResponse> {
        self.upgrade_at(user_id, request, Utc::now()).await
    }

    pub async fn upgrade_at(
        &self,
        user_id: Uuid,
        request: UpgradeRequest,
        now: DateTime<Utc>,
    ) -> AppResult<UpgradeResponse> {
        let (company, subscription) =
            load_owned_subscription(self.store.as_ref(), user_id, request.subscription_id).await?;
        ensure_can_change_plan(self.store.as_ref(), &subscription, &request).await?;

        let card = match request.billing_method {
            BillingMethod::Pix => None,
            BillingMethod::CreditCard => Some(card_for_upgrade(
                &company,
                &subscription,
                request.credit_card.as_ref(),
            )?),
        };

        let current_price = self
            .store
            .find_plan_price(&subscription.plan_id, subscription.cycle)
            .await?
            .ok_or_else(|| AppError::NotFound("Current plan price not found".to_string()))?;
        let target_price = self
            .store
            .find_plan_price(&request.to_plan_id, request.to_cycle)
            .await?
            .ok_or_else(|| AppError::ValidationError("Invalid plan or cycle".to_string()))?;

        let proration = proration::compute(
            current_price.amount_cents,
            target_price.amount_cents,
            subscription.current_period_start,
            subscription.current_period_end,
            now,
        );
        log::info!(
            "Upgrade of subscription {} to {}/{}: credit {} charge {}",
            subscription.id,
            request.to_plan_id,
            request.to_cycle,
            proration.credit_cents,
            proration.charge_cents
        );

        if proration.charge_cents > 0 {
            self.charge_and_defer(&subscription, &request, card, proration.charge_cents, now)
                .await
        } else {
            self.swap_now(&subscription, &request, card, now).await
        }
    }

    /// Charges the prorated amount; the plan swap waits for the payment.
    async fn charge_and_defer(
        &self,
        subscription: &subscription_entity::Model,
        request: &UpgradeRequest,
        card: Option<CardCredentials>,
        charge_cents: i64,
        now: DateTime<Utc>,
    ) -> AppResult<UpgradeResponse> {
        let stored_token = match &card {
            Some(CardCredentials::Token(token)) => Some(token.clone()),
            _ => None,
        };
        let payment = self
            .gateway
            .create_charge(&ChargeSpec {
                customer_id: subscription.gateway_customer_id.clone(),
                billing_method: request.billing_method,
                value_cents: charge_cents,
                due_date: now.date_naive(),
                description: format!(
                    "Upgrade to {} ({})",
                    request.to_plan_id, request.to_cycle
                ),
                external_reference: format!(
                    "UPGRADE_{}_{}_{}",
                    subscription.id, request.to_plan_id, request.to_cycle
                ),
                card: card.clone(),
            })
            .await?;

        let mut saga = Saga::new("upgrade", self.gateway.as_ref());
        saga.record(CompensatingAction::CancelCharge(payment.id.clone()));

        let change = match self
            .store
            .insert_change(NewSubscriptionChange {
                subscription_id: subscription.id,
                company_id: subscription.company_id,
                change_type: ChangeType::Upgrade,
                to_plan_id: request.to_plan_id.clone(),
                to_cycle: request.to_cycle,
                billing_method: request.billing_method,
                proration_cents: Some(charge_cents),
                effective_at: now,
                status: ChangeStatus::Processing,
                gateway_payment_id: Some(payment.id.clone()),
                card_token: payment.card_token.clone().or(stored_token),
            })
            .await
        {
            Ok(change) => change,
            Err(e) => return Err(saga.fail("record_change", e).await),
        };

        let pix = if request.billing_method.is_instant() {
            match self.gateway.get_instant_payment_code(&payment.id).await {
                Ok(code) => Some(PixCharge {
                    payment_id: payment.id.clone(),
                    encoded_image: code.encoded_image,
                    payload: code.payload,
                    expiration_date: code.expiration_date,
                }),
                Err(e) => {
                    log::warn!("Could not fetch PIX code for charge {}: {e}", payment.id);
                    None
                }
            }
        } else {
            None
        };

        if let Err(e) = self
            .store
            .upsert_payment(PaymentUpsert {
                gateway_payment_id: payment.id.clone(),
                subscription_id: subscription.id,
                company_id: subscription.company_id,
                billing_method: request.billing_method,
                amount_cents: charge_cents,
                status: PaymentStatus::Pending,
                due_date: payment.due_date,
                paid_at: None,
                pix_qr_code: pix.as_ref().map(|p| p.encoded_image.clone()),
                pix_payload: pix.as_ref().map(|p| p.payload.clone()),
                invoice_url: payment.invoice_url.clone(),
            })
            .await
        {
            if let Err(mark) = self
                .store
                .transition_change(
                    change.id,
                    ChangeStatus::Processing,
                    ChangeStatus::Failed,
                    Some(e.to_string()),
                    Some(now),
                )
                .await
            {
                log::error!("Could not mark change {} failed: {mark}", change.id);
            }
            return Err(saga.fail("record_payment", e).await);
        }
        let mut compensations = saga.finish();

        // card charges may settle synchronously
        let mut status = ChangeStatus::Processing;
        if payment.is_settled() && self.store.confirm_payment(&payment.id, now).await? {
            let completion = complete_change(
                self.store.as_ref(),
                self.gateway.as_ref(),
                &change,
                card,
                request.to_cycle.period_end(now).date_naive(),
                now,
            )
            .await?;
            if let Some(e) = &completion.failure {
                log::error!("Settled upgrade {} could not be applied: {e}", change.id);
            }
            status = completion.status;
            compensations.extend(completion.compensations);
        }

        Ok(UpgradeResponse {
            change_id: change.id,
            status,
            proration_cents: charge_cents,
            payment_id: Some(payment.id),
            pix,
            compensations,
        })
    }

    /// Nothing to charge: swap plans right away.
    async fn swap_now(
        &self,
        subscription: &subscription_entity::Model,
        request: &UpgradeRequest,
        card: Option<CardCredentials>,
        now: DateTime<Utc>,
    ) -> AppResult<UpgradeResponse> {
        let change = self
            .store
            .insert_change(NewSubscriptionChange {
                subscription_id: subscription.id,
                company_id: subscription.company_id,
                change_type: ChangeType::Upgrade,
                to_plan_id: request.to_plan_id.clone(),
                to_cycle: request.to_cycle,
                billing_method: request.billing_method,
                proration_cents: Some(0),
                effective_at: now,
                status: ChangeStatus::Processing,
                gateway_payment_id: None,
                card_token: subscription.card_token.clone(),
            })
            .await?;

        let completion = complete_change(
            self.store.as_ref(),
            self.gateway.as_ref(),
            &change,
            card,
            now.date_naive(),
            now,
        )
        .await?;
        if let Some(e) = completion.failure {
            return Err(e);
        }

        Ok(UpgradeResponse {
            change_id: change.id,
            status: completion.status,
            proration_cents: 0,
            payment_id: None,
            pix: None,
            compensations: completion.compensations,
        })
    }
}

async fn ensure_can_change_plan(
    store: &dyn SubscriptionStore,
    subscription: &subscription_entity::Model,
    request: &UpgradeRequest,
) -> AppResult<()> {
    if !subscription.status.accepts_plan_changes() {
        return Err(AppError::ValidationError(
            "Subscription is being canceled".to_string(),
        ));
    }
    if subscription.plan_id == request.to_plan_id && subscription.cycle == request.to_cycle {
        return Err(AppError::ValidationError(
            "Subscription is already on this plan".to_string(),
        ));
    }
    if !store.find_open_changes(subscription.id).await?.is_empty() {
        return Err(AppError::ValidationError(
            "A plan change is already in progress".to_string(),
        ));
    }
    Ok(())
}

/// Fresh card data wins over the stored token.
fn card_for_upgrade(
    company: &company_entity::Model,
    subscription: &subscription_entity::Model,
    card: Option<&CreditCard>,
) -> AppResult<CardCredentials> {
    if let Some(card) = card {
        return Ok(CardCredentials::Raw {
            card: card.clone(),
            holder: CardHolderInfo {
                name: company.legal_name.clone(),
                email: company.email.clone(),
                tax_id: company.tax_id.clone(),
                postal_code: company
                    .postal_code
                    .clone()
                    .unwrap_or_else(|| "00000000".to_string()),
                address_number: company
                    .address_number
                    .clone()
                    .unwrap_or_else(|| "0".to_string()),
                phone: company.phone.clone().unwrap_or_default(),
            },
        });
    }
    subscription
        .card_token
        .clone()
        .map(CardCredentials::Token)
        .ok_or_else(|| AppError::ValidationError("Credit card details are required".to_string()))
}
