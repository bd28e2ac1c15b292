use super::ownership::load_owned_subscription;
use super::saga::{CompensatingAction, Saga};
use crate::database::{SubscriptionPatch, SubscriptionStore};
use crate::entities::SubscriptionStatus;
use crate::error::{AppError, AppResult};
use crate::external::PaymentGateway;
use crate::models::{CancelRequest, CancelResponse};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CancellationService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl CancellationService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn cancel(&self, user_id: Uuid, request: CancelRequest) -> AppResult<CancelResponse> {
        self.cancel_at(user_id, request, Utc::now()).await
    }

    /// Stops future billing. Access stays valid through `access_until`.
    pub async fn cancel_at(
        &self,
        user_id: Uuid,
        request: CancelRequest,
        now: DateTime<Utc>,
    ) -> AppResult<CancelResponse> {
        let (_, subscription) =
            load_owned_subscription(self.store.as_ref(), user_id, request.subscription_id).await?;

        if matches!(
            subscription.status,
            SubscriptionStatus::Canceled | SubscriptionStatus::CancelRequested
        ) {
            return Err(AppError::ValidationError(
                "Subscription is already canceled".to_string(),
            ));
        }

        let mut saga = Saga::new("cancel", self.gateway.as_ref());
        if let Some(gateway_id) = &subscription.gateway_subscription_id {
            saga.best_effort(CompensatingAction::CancelExternalSubscription(
                gateway_id.clone(),
            ))
            .await;
        }

        let updated = self
            .store
            .update_subscription(
                subscription.id,
                subscription.version,
                SubscriptionPatch {
                    status: Some(SubscriptionStatus::CancelRequested),
                    cancel_at_period_end: Some(true),
                    canceled_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        log::info!(
            "Subscription {} cancel requested; access until {}",
            updated.id,
            updated.access_until
        );

        Ok(CancelResponse {
            subscription_id: updated.id,
            status: updated.status,
            access_until: updated.access_until,
            compensations: saga.finish(),
        })
    }
}
