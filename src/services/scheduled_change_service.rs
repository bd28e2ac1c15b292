use super::plan_swap::complete_change;
use crate::database::{SubscriptionPatch, SubscriptionStore};
use crate::entities::{ChangeStatus, SubscriptionStatus};
use crate::error::{AppError, AppResult};
use crate::external::PaymentGateway;
use crate::models::{ChangeOutcome, ProcessScheduledChangesResponse};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Batch side of plan changes: applies due scheduled changes and closes
/// cancellations whose paid access has run out.
#[derive(Clone)]
pub struct ScheduledChangeService {
    store: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ScheduledChangeService {
    pub fn new(store: Arc<dyn SubscriptionStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    pub async fn process_due(&self) -> AppResult<ProcessScheduledChangesResponse> {
        self.process_due_at(Utc::now()).await
    }

    /// Items fail independently; only a failure to list the due changes
    /// aborts the run.
    pub async fn process_due_at(
        &self,
        now: DateTime<Utc>,
    ) -> AppResult<ProcessScheduledChangesResponse> {
        let due = self.store.list_due_changes(now).await?;
        log::info!("Processing {} scheduled change(s)", due.len());

        let mut results = Vec::with_capacity(due.len());
        for mut change in due {
            let claimed = match self
                .store
                .transition_change(
                    change.id,
                    ChangeStatus::Scheduled,
                    ChangeStatus::Processing,
                    None,
                    None,
                )
                .await
            {
                Ok(claimed) => claimed,
                Err(e) => {
                    log::error!("Could not claim change {}: {e}", change.id);
                    results.push(ChangeOutcome {
                        change_id: change.id,
                        status: change.status,
                        error: Some(e.to_string()),
                        compensations: Vec::new(),
                    });
                    continue;
                }
            };
            if !claimed {
                log::info!("Change {} was claimed by another run", change.id);
                continue;
            }
            change.status = ChangeStatus::Processing;

            let outcome = match complete_change(
                self.store.as_ref(),
                self.gateway.as_ref(),
                &change,
                None,
                now.date_naive(),
                now,
            )
            .await
            {
                Ok(completion) => ChangeOutcome {
                    change_id: change.id,
                    status: completion.status,
                    error: completion.failure.map(|e| e.to_string()),
                    compensations: completion.compensations,
                },
                Err(e) => ChangeOutcome {
                    change_id: change.id,
                    status: ChangeStatus::Processing,
                    error: Some(e.to_string()),
                    compensations: Vec::new(),
                },
            };
            match serde_json::to_string(&outcome) {
                Ok(rendered) if outcome.error.is_some() => {
                    log::warn!(target: "billing::saga", "{rendered}")
                }
                Ok(rendered) => log::info!(target: "billing::saga", "{rendered}"),
                Err(_) => log::warn!("Change {} finished as {}", outcome.change_id, outcome.status),
            }
            results.push(outcome);
        }

        Ok(ProcessScheduledChangesResponse {
            processed: results.len(),
            results,
        })
    }

    pub async fn finalize_expired_cancellations(&self) -> AppResult<usize> {
        self.finalize_expired_cancellations_at(Utc::now()).await
    }

    /// Moves `cancel_requested` subscriptions past `access_until` to `canceled`.
    pub async fn finalize_expired_cancellations_at(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let due = self.store.list_cancellations_due(now).await?;
        let mut finalized = 0;
        for subscription in due {
            let patch = SubscriptionPatch {
                status: Some(SubscriptionStatus::Canceled),
                ..Default::default()
            };
            match self
                .store
                .update_subscription(subscription.id, subscription.version, patch)
                .await
            {
                Ok(_) => finalized += 1,
                Err(AppError::ConcurrentModification(msg)) => {
                    log::warn!("Skipping cancellation of {}: {msg}", subscription.id)
                }
                Err(e) => return Err(e),
            }
        }
        if finalized > 0 {
            log::info!("Finalized {finalized} expired cancellation(s)");
        }
        Ok(finalized)
    }
}
