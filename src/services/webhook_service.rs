use super::plan_swap::complete_change;
use crate::database::{NewGatewayEvent, PaymentUpsert, SubscriptionPatch, SubscriptionStore};
use crate::entities::{
    BillingMethod, ChangeStatus, ChangeType, PaymentStatus, SubscriptionStatus,
    subscription_change_entity, subscription_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{GatewayEvent, PaymentEvent, PaymentGateway, WebhookPayload};
use crate::models::WebhookAck;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Versioned subscription writes retried after losing a race.
const WRITE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct WebhookService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_token: String,
}

impl WebhookService {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_token: String,
    ) -> Self {
        Self {
            store,
            gateway,
            webhook_token,
        }
    }

    /// Constant-time check of the shared secret. An unset secret accepts
    /// nothing.
    pub fn verify_token(&self, provided: Option<&str>) -> bool {
        let expected = self.webhook_token.as_bytes();
        match provided {
            Some(token) if !expected.is_empty() => token.as_bytes().ct_eq(expected).into(),
            _ => false,
        }
    }

    pub async fn ingest(&self, payload: Value) -> AppResult<WebhookAck> {
        self.ingest_at(payload, Utc::now()).await
    }

    /// Logs the event once, then applies it. Permanent errors after the
    /// event is logged are reported in the ack; transient ones release the
    /// event and fail the delivery so the gateway sends it again.
    pub async fn ingest_at(&self, payload: Value, now: DateTime<Utc>) -> AppResult<WebhookAck> {
        let parsed: WebhookPayload = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::ValidationError(format!("Invalid webhook payload: {e}")))?;
        let event_id = parsed.event_id().ok_or_else(|| {
            AppError::ValidationError("Webhook payload has no payment or subscription".to_string())
        })?;

        if self.store.gateway_event_exists(&event_id).await? {
            log::info!("Webhook {event_id} already processed");
            return Ok(WebhookAck::duplicate());
        }
        let recorded = self
            .store
            .record_gateway_event(NewGatewayEvent {
                event_id: event_id.clone(),
                event_type: parsed.event.clone(),
                payload,
            })
            .await?;
        if !recorded {
            log::info!("Webhook {event_id} recorded concurrently, skipping");
            return Ok(WebhookAck::duplicate());
        }

        match self.apply(parsed.to_event(), now).await {
            Ok(()) => Ok(WebhookAck::processed()),
            Err(e) if e.is_transient() => {
                log::warn!("Webhook {event_id} hit a transient failure, awaiting redelivery: {e}");
                self.store.release_gateway_event(&event_id).await?;
                Err(e)
            }
            Err(e) => {
                log::error!("Webhook {event_id} could not be applied: {e}");
                Ok(WebhookAck::failed(e.root_cause().to_string()))
            }
        }
    }

    async fn apply(&self, event: GatewayEvent, now: DateTime<Utc>) -> AppResult<()> {
        match event {
            GatewayEvent::PaymentConfirmed(payment) => self.on_confirmed(payment, now).await,
            GatewayEvent::PaymentOverdue(payment) => self.on_overdue(payment, now).await,
            GatewayEvent::PaymentRefunded(payment) => self.on_refunded(payment, now).await,
            GatewayEvent::Unknown(kind) => {
                log::info!("Ignoring gateway event {kind}");
                Ok(())
            }
        }
    }

    async fn on_confirmed(&self, payment: PaymentEvent, now: DateTime<Utc>) -> AppResult<()> {
        let paid_at = payment
            .paid_on
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        if let Some(change) = self.upgrade_change_for(&payment.payment_id).await? {
            return self.complete_upgrade(change, paid_at, now).await;
        }

        let subscription = self.subscription_for(&payment).await?;
        let amount_cents = match payment.value_cents {
            Some(value) => value,
            None => self
                .store
                .find_payment(&payment.payment_id)
                .await?
                .map(|p| p.amount_cents)
                .unwrap_or_default(),
        };

        // subscription first: a failed write must not leave the payment
        // confirmed on its own
        let subscription = self
            .patch_subscription(subscription, |current| {
                if current.status.can_transition_to(SubscriptionStatus::Active) {
                    let period_end = current.cycle.period_end(paid_at);
                    SubscriptionPatch {
                        status: Some(SubscriptionStatus::Active),
                        current_period_start: Some(paid_at),
                        current_period_end: Some(period_end),
                        access_until: Some(period_end.max(current.access_until)),
                        last_gateway_event_at: Some(now),
                        ..Default::default()
                    }
                } else {
                    log::warn!(
                        "Payment {} confirmed for {} subscription {}; status kept",
                        payment.payment_id,
                        current.status,
                        current.id
                    );
                    SubscriptionPatch {
                        last_gateway_event_at: Some(now),
                        ..Default::default()
                    }
                }
            })
            .await?;

        self.store
            .upsert_payment(PaymentUpsert {
                gateway_payment_id: payment.payment_id.clone(),
                subscription_id: subscription.id,
                company_id: subscription.company_id,
                billing_method: billing_method_of(&payment, &subscription),
                amount_cents,
                status: PaymentStatus::Confirmed,
                due_date: payment.due_date,
                paid_at: Some(paid_at),
                pix_qr_code: None,
                pix_payload: None,
                invoice_url: payment.invoice_url.clone(),
            })
            .await?;
        Ok(())
    }

    /// The conditional pending -> confirmed flip decides who runs the swap.
    async fn complete_upgrade(
        &self,
        change: subscription_change_entity::Model,
        paid_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(payment_id) = change.gateway_payment_id.as_deref() else {
            return Ok(());
        };
        if !self.store.confirm_payment(payment_id, paid_at).await? {
            log::info!("Upgrade charge {payment_id} already confirmed");
            return Ok(());
        }

        let completion = complete_change(
            self.store.as_ref(),
            self.gateway.as_ref(),
            &change,
            None,
            change.to_cycle.period_end(now).date_naive(),
            now,
        )
        .await?;
        // the claim is spent, so a redelivery could not retry the swap
        match completion.failure {
            Some(e) => Err(AppError::InternalError(format!(
                "Upgrade {} paid by {payment_id} could not be applied: {e}",
                change.id
            ))),
            None => {
                log::info!("Upgrade {} completed by payment {payment_id}", change.id);
                Ok(())
            }
        }
    }

    async fn on_overdue(&self, payment: PaymentEvent, now: DateTime<Utc>) -> AppResult<()> {
        let payment_known = self
            .store
            .update_payment_status(&payment.payment_id, PaymentStatus::Overdue)
            .await?;

        // an overdue PIX charge can still be paid; the upgrade stays open
        if let Some(change) = self.upgrade_change_for(&payment.payment_id).await? {
            log::info!(
                "Upgrade charge {} overdue, change {} stays {}",
                payment.payment_id,
                change.id,
                change.status
            );
            return Ok(());
        }

        let subscription = self.subscription_for(&payment).await?;
        if !payment_known {
            self.store
                .upsert_payment(PaymentUpsert {
                    gateway_payment_id: payment.payment_id.clone(),
                    subscription_id: subscription.id,
                    company_id: subscription.company_id,
                    billing_method: billing_method_of(&payment, &subscription),
                    amount_cents: payment.value_cents.unwrap_or_default(),
                    status: PaymentStatus::Overdue,
                    due_date: payment.due_date,
                    paid_at: None,
                    pix_qr_code: None,
                    pix_payload: None,
                    invoice_url: payment.invoice_url.clone(),
                })
                .await?;
        }

        self.patch_subscription(subscription, |current| SubscriptionPatch {
            status: current
                .status
                .can_transition_to(SubscriptionStatus::Overdue)
                .then_some(SubscriptionStatus::Overdue),
            last_gateway_event_at: Some(now),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    async fn on_refunded(&self, payment: PaymentEvent, now: DateTime<Utc>) -> AppResult<()> {
        if !self
            .store
            .update_payment_status(&payment.payment_id, PaymentStatus::Refunded)
            .await?
        {
            log::warn!("Refund for unknown payment {}", payment.payment_id);
        }

        // a refunded upgrade charge will never pay for the swap
        if let Some(change) = self.upgrade_change_for(&payment.payment_id).await?
            && change.status == ChangeStatus::Processing
        {
            self.store
                .transition_change(
                    change.id,
                    ChangeStatus::Processing,
                    ChangeStatus::Failed,
                    Some("Upgrade charge refunded".to_string()),
                    Some(now),
                )
                .await?;
        }
        Ok(())
    }

    /// Versioned update that re-reads the row and rebuilds the patch when
    /// another writer got there first.
    async fn patch_subscription<F>(
        &self,
        mut subscription: subscription_entity::Model,
        build: F,
    ) -> AppResult<subscription_entity::Model>
    where
        F: Fn(&subscription_entity::Model) -> SubscriptionPatch,
    {
        let mut attempt = 1;
        loop {
            let patch = build(&subscription);
            match self
                .store
                .update_subscription(subscription.id, subscription.version, patch)
                .await
            {
                Err(AppError::ConcurrentModification(msg)) if attempt < WRITE_ATTEMPTS => {
                    log::warn!(
                        "Subscription {} changed underneath webhook (attempt {attempt}): {msg}",
                        subscription.id
                    );
                    attempt += 1;
                    subscription = self
                        .store
                        .find_subscription(subscription.id)
                        .await?
                        .ok_or_else(|| {
                            AppError::NotFound(format!("Subscription {} not found", subscription.id))
                        })?;
                }
                other => return other,
            }
        }
    }

    async fn upgrade_change_for(
        &self,
        payment_id: &str,
    ) -> AppResult<Option<subscription_change_entity::Model>> {
        Ok(self
            .store
            .find_change_by_payment_id(payment_id)
            .await?
            .filter(|c| c.change_type == ChangeType::Upgrade))
    }

    async fn subscription_for(&self, payment: &PaymentEvent) -> AppResult<subscription_entity::Model> {
        let gateway_id = payment.gateway_subscription_id.as_deref().ok_or_else(|| {
            AppError::ValidationError(format!(
                "Payment {} is not linked to a subscription",
                payment.payment_id
            ))
        })?;
        self.store
            .find_subscription_by_gateway_id(gateway_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Subscription {gateway_id} not found")))
    }
}

fn billing_method_of(
    payment: &PaymentEvent,
    subscription: &subscription_entity::Model,
) -> BillingMethod {
    match payment.billing_type.as_deref() {
        Some("PIX") => BillingMethod::Pix,
        Some("CREDIT_CARD") => BillingMethod::CreditCard,
        _ => subscription.billing_method,
    }
}
