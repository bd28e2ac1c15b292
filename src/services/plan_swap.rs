//! Replaces a subscription's gateway subscription with one for another plan.
//!
//! Shared by the zero-charge upgrade, the deferred upgrade completion and the
//! scheduled change processor. Steps run in order: cancel the old gateway
//! subscription (best-effort), create the new one, write the local row, then
//! close the change record.

use super::saga::{CompensatingAction, CompensationResult, Saga};
use crate::database::{SubscriptionPatch, SubscriptionStore};
use crate::entities::{
    BillingCycle, BillingMethod, ChangeStatus, SubscriptionStatus, subscription_change_entity,
    subscription_entity,
};
use crate::error::{AppError, AppResult};
use crate::external::{CardCredentials, PaymentGateway, SubscriptionSpec};
use chrono::{DateTime, NaiveDate, Utc};

pub struct PlanSwap<'a> {
    pub subscription: &'a subscription_entity::Model,
    pub to_plan_id: &'a str,
    pub to_cycle: BillingCycle,
    pub billing_method: BillingMethod,
    pub card: Option<CardCredentials>,
    pub next_due_date: NaiveDate,
    pub now: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SwapOutcome {
    pub subscription: subscription_entity::Model,
    pub compensations: Vec<CompensationResult>,
}

/// Card subscriptions created outside a checkout can only be billed through
/// a stored token.
pub fn card_credentials_for(
    method: BillingMethod,
    token: Option<&str>,
) -> AppResult<Option<CardCredentials>> {
    match method {
        BillingMethod::Pix => Ok(None),
        BillingMethod::CreditCard => token
            .map(|t| Some(CardCredentials::Token(t.to_string())))
            .ok_or_else(|| {
                AppError::ValidationError(
                    "No stored card for this subscription; card details are required".to_string(),
                )
            }),
    }
}

pub async fn swap_plan(
    store: &dyn SubscriptionStore,
    gateway: &dyn PaymentGateway,
    swap: PlanSwap<'_>,
) -> AppResult<SwapOutcome> {
    let sub = swap.subscription;
    let price = store
        .find_plan_price(swap.to_plan_id, swap.to_cycle)
        .await?
        .ok_or_else(|| AppError::ValidationError("Invalid plan or cycle".to_string()))?;
    let stored_token = match &swap.card {
        Some(CardCredentials::Token(token)) => Some(token.clone()),
        _ => None,
    };

    let mut saga = Saga::new("plan_swap", gateway);

    // the old subscription may already be gone at the gateway
    if let Some(old_id) = &sub.gateway_subscription_id {
        saga.best_effort(CompensatingAction::CancelExternalSubscription(
            old_id.clone(),
        ))
        .await;
    }

    let spec = SubscriptionSpec {
        customer_id: sub.gateway_customer_id.clone(),
        billing_method: swap.billing_method,
        value_cents: price.amount_cents,
        next_due_date: swap.next_due_date,
        cycle: swap.to_cycle,
        description: format!("Plan {} ({})", swap.to_plan_id, swap.to_cycle),
        external_reference: format!("SUB_{}", sub.id),
        card: swap.card,
    };
    let created = match gateway.create_subscription(&spec).await {
        Ok(created) => created,
        Err(e) => return Err(saga.fail("create_gateway_subscription", e.into()).await),
    };
    saga.record(CompensatingAction::CancelExternalSubscription(
        created.id.clone(),
    ));

    let period_end = swap.to_cycle.period_end(swap.now);
    let patch = SubscriptionPatch {
        plan_id: Some(swap.to_plan_id.to_string()),
        cycle: Some(swap.to_cycle),
        billing_method: Some(swap.billing_method),
        status: Some(SubscriptionStatus::Active),
        current_period_start: Some(swap.now),
        current_period_end: Some(period_end),
        access_until: Some(period_end),
        gateway_subscription_id: Some(created.id.clone()),
        card_token: created.card_token.clone().or(stored_token),
        ..Default::default()
    };
    let updated = match store.update_subscription(sub.id, sub.version, patch).await {
        Ok(updated) => updated,
        Err(e) => return Err(saga.fail("persist_subscription", e).await),
    };

    log::info!(
        "Subscription {} moved to {}/{} (gateway {})",
        sub.id,
        swap.to_plan_id,
        swap.to_cycle,
        created.id
    );

    Ok(SwapOutcome {
        subscription: updated,
        compensations: saga.finish(),
    })
}

/// How a processing change ended. `failure` carries the error that failed
/// it; the change row is already marked when this is returned.
#[derive(Debug)]
pub struct ChangeCompletion {
    pub status: ChangeStatus,
    pub failure: Option<AppError>,
    pub compensations: Vec<CompensationResult>,
}

/// Applies a `processing` change to its subscription and records the result
/// on the change. `card` overrides the stored token for card billing.
///
/// Only store errors while closing the change are returned as `Err`.
pub async fn complete_change(
    store: &dyn SubscriptionStore,
    gateway: &dyn PaymentGateway,
    change: &subscription_change_entity::Model,
    card: Option<CardCredentials>,
    next_due_date: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<ChangeCompletion> {
    if change.status != ChangeStatus::Processing {
        log::info!(
            "Change {} is {}, nothing to apply",
            change.id,
            change.status
        );
        return Ok(ChangeCompletion {
            status: change.status,
            failure: None,
            compensations: Vec::new(),
        });
    }

    match apply_change(store, gateway, change, card, next_due_date, now).await {
        Ok(outcome) => {
            store
                .transition_change(
                    change.id,
                    ChangeStatus::Processing,
                    ChangeStatus::Done,
                    None,
                    Some(now),
                )
                .await?;
            Ok(ChangeCompletion {
                status: ChangeStatus::Done,
                failure: None,
                compensations: outcome.compensations,
            })
        }
        Err(e) => {
            log::error!(
                target: "billing::saga",
                "{} change {} failed: {e}",
                change.change_type,
                change.id
            );
            store
                .transition_change(
                    change.id,
                    ChangeStatus::Processing,
                    ChangeStatus::Failed,
                    Some(e.to_string()),
                    Some(now),
                )
                .await?;
            Ok(ChangeCompletion {
                status: ChangeStatus::Failed,
                compensations: e.compensations(),
                failure: Some(e),
            })
        }
    }
}

async fn apply_change(
    store: &dyn SubscriptionStore,
    gateway: &dyn PaymentGateway,
    change: &subscription_change_entity::Model,
    card: Option<CardCredentials>,
    next_due_date: NaiveDate,
    now: DateTime<Utc>,
) -> AppResult<SwapOutcome> {
    let subscription = store
        .find_subscription(change.subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
    if !subscription.status.accepts_plan_changes() {
        return Err(AppError::ValidationError(format!(
            "Subscription is {} and no longer accepts plan changes",
            subscription.status
        )));
    }

    let card = match (change.billing_method, card) {
        (BillingMethod::CreditCard, Some(card)) => Some(card),
        (method, _) => card_credentials_for(
            method,
            change
                .card_token
                .as_deref()
                .or(subscription.card_token.as_deref()),
        )?,
    };

    swap_plan(
        store,
        gateway,
        PlanSwap {
            subscription: &subscription,
            to_plan_id: &change.to_plan_id,
            to_cycle: change.to_cycle,
            billing_method: change.billing_method,
            card,
            next_due_date,
            now,
        },
    )
    .await
}
