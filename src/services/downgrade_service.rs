use super::ownership::load_owned_subscription;
use crate::database::{NewSubscriptionChange, SubscriptionStore};
use crate::entities::{BillingMethod, ChangeStatus, ChangeType};
use crate::error::{AppError, AppResult};
use crate::models::{ScheduleDowngradeRequest, ScheduleDowngradeResponse};
use std::sync::Arc;
use uuid::Uuid;

/// Records plan changes that take effect when the paid period ends. No
/// gateway calls happen here; the scheduled change processor does them.
#[derive(Clone)]
pub struct DowngradeService {
    store: Arc<dyn SubscriptionStore>,
}

impl DowngradeService {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn schedule(
        &self,
        user_id: Uuid,
        request: ScheduleDowngradeRequest,
    ) -> AppResult<ScheduleDowngradeResponse> {
        let (_, subscription) =
            load_owned_subscription(self.store.as_ref(), user_id, request.subscription_id).await?;

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
        if !self
            .store
            .find_open_changes(subscription.id)
            .await?
            .is_empty()
        {
            return Err(AppError::ValidationError(
                "A plan change is already in progress".to_string(),
            ));
        }
        self.store
            .find_plan_price(&request.to_plan_id, request.to_cycle)
            .await?
            .ok_or_else(|| AppError::ValidationError("Invalid plan or cycle".to_string()))?;

        // the processor can only bill a card it has a token for
        if subscription.billing_method == BillingMethod::CreditCard
            && subscription.card_token.is_none()
        {
            return Err(AppError::ValidationError(
                "No stored card for this subscription; switch to PIX or upgrade with card details"
                    .to_string(),
            ));
        }

        let change = self
            .store
            .insert_change(NewSubscriptionChange {
                subscription_id: subscription.id,
                company_id: subscription.company_id,
                change_type: ChangeType::Downgrade,
                to_plan_id: request.to_plan_id,
                to_cycle: request.to_cycle,
                billing_method: subscription.billing_method,
                proration_cents: None,
                effective_at: subscription.current_period_end,
                status: ChangeStatus::Scheduled,
                gateway_payment_id: None,
                card_token: subscription.card_token.clone(),
            })
            .await?;

        log::info!(
            "Downgrade {} scheduled for subscription {} at {}",
            change.id,
            subscription.id,
            change.effective_at
        );

        Ok(ScheduleDowngradeResponse {
            change_id: change.id,
            status: change.status,
            effective_at: change.effective_at,
        })
    }
}
