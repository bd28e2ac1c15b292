use crate::database::{SubscriptionPatch, SubscriptionStore};
use crate::entities::SubscriptionStatus;
use crate::error::{AppError, AppResult};
use crate::external::PaymentGateway;
use crate::models::SyncStatusResponse;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Local status for a gateway subscription status. Unknown values map to
/// `None` and leave the row alone.
pub fn map_gateway_status(upstream: &str) -> Option<SubscriptionStatus> {
    match upstream {
        "ACTIVE" | "RECEIVED" => Some(SubscriptionStatus::Active),
        "OVERDUE" | "EXPIRED" => Some(SubscriptionStatus::Overdue),
        "INACTIVE" => Some(SubscriptionStatus::Canceled),
        _ => None,
    }
}

#[derive(Clone)]
pub struct StatusSyncService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl StatusSyncService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn sync(&self, user_id: Uuid) -> AppResult<SyncStatusResponse> {
        self.sync_at(user_id, Utc::now()).await
    }

    /// Reconciles the caller's live subscription with the gateway.
    pub async fn sync_at(&self, user_id: Uuid, now: DateTime<Utc>) -> AppResult<SyncStatusResponse> {
        let company = self
            .store
            .find_company_by_owner(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Company not found".to_string()))?;
        let subscription = self
            .store
            .find_live_subscription_for_company(company.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;
        let gateway_id = subscription.gateway_subscription_id.clone().ok_or_else(|| {
            AppError::ValidationError("Subscription has no gateway subscription".to_string())
        })?;

        let external = self.gateway.get_subscription(&gateway_id).await?;

        let mut next = map_gateway_status(&external.status)
            .filter(|mapped| *mapped != subscription.status)
            .filter(|mapped| subscription.status.can_transition_to(*mapped));
        // the gateway reports trial subscriptions as ACTIVE
        if subscription.status == SubscriptionStatus::Trialing
            && next == Some(SubscriptionStatus::Active)
            && subscription.trial_ends_at.is_some_and(|end| end > now)
        {
            next = None;
        }

        if let Some(status) = next {
            log::info!(
                "Subscription {} drifted: {} -> {} (gateway {})",
                subscription.id,
                subscription.status,
                status,
                external.status
            );
        }

        let updated = self
            .store
            .update_subscription(
                subscription.id,
                subscription.version,
                SubscriptionPatch {
                    status: next,
                    last_synced_at: Some(now),
                    ..Default::default()
                },
            )
            .await?;

        Ok(SyncStatusResponse {
            subscription_id: updated.id,
            status: updated.status,
            upstream_status: external.status,
            changed: next.is_some(),
            last_synced_at: updated.last_synced_at,
        })
    }
}
