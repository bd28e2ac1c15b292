//! Background scheduled tasks for the billing service.
//!
//! Call `spawn_all` once during startup when the in-process scheduler is
//! enabled. The processor endpoint under `/internal` stays available to an
//! external cron either way.

use crate::services::ScheduledChangeService;
use std::time::Duration;

/// Spawn all background tasks.
///
/// Each loop runs its first pass immediately and then sleeps
/// `interval_secs`. Tasks are detached via `tokio::spawn`.
pub fn spawn_all(scheduled_change_service: ScheduledChangeService, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs.max(1));

    // scheduled downgrades
    {
        let svc = scheduled_change_service.clone();
        tokio::spawn(async move {
            loop {
                match svc.process_due().await {
                    Ok(r) if r.processed > 0 => {
                        let failed = r.results.iter().filter(|o| o.error.is_some()).count();
                        log::info!("Scheduled changes processed: {} ({failed} failed)", r.processed);
                    }
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to process scheduled changes: {e:?}"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }

    // cancellations whose paid access ended
    {
        let svc = scheduled_change_service;
        tokio::spawn(async move {
            loop {
                match svc.finalize_expired_cancellations().await {
                    Ok(n) if n > 0 => log::info!("Cancellations finalized: {n}"),
                    Ok(_) => {}
                    Err(e) => log::error!("Failed to finalize cancellations: {e:?}"),
                }
                tokio::time::sleep(interval).await;
            }
        });
    }
}
