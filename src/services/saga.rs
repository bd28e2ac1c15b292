//! Ordered multi-step operations across the gateway and the local store.
//!
//! Each step that creates something at the gateway registers the action
//! that undoes it. On failure the registered actions run in reverse order.
//! Compensations are best-effort: their failures are reported as
//! [`CompensationResult`]s and logged under `billing::saga`, never retried.

use crate::error::AppError;
use crate::external::PaymentGateway;
use serde::Serialize;

const LOG_TARGET: &str = "billing::saga";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "target", rename_all = "snake_case")]
pub enum CompensatingAction {
    CancelExternalSubscription(String),
    CancelCharge(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum CompensationOutcome {
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationResult {
    #[serde(flatten)]
    pub action: CompensatingAction,
    #[serde(flatten)]
    pub outcome: CompensationOutcome,
}

impl CompensationResult {
    pub fn applied(&self) -> bool {
        self.outcome == CompensationOutcome::Applied
    }
}

async fn execute(gateway: &dyn PaymentGateway, action: CompensatingAction) -> CompensationResult {
    let result = match &action {
        CompensatingAction::CancelExternalSubscription(id) => gateway.cancel_subscription(id).await,
        CompensatingAction::CancelCharge(id) => gateway.cancel_charge(id).await,
    };
    let outcome = match result {
        Ok(()) => CompensationOutcome::Applied,
        Err(e) => CompensationOutcome::Failed(e.to_string()),
    };
    let result = CompensationResult { action, outcome };
    let rendered = serde_json::to_string(&result).unwrap_or_else(|_| format!("{result:?}"));
    if result.applied() {
        log::info!(target: LOG_TARGET, "{rendered}");
    } else {
        log::warn!(target: LOG_TARGET, "{rendered}");
    }
    result
}

pub struct Saga<'a> {
    name: &'static str,
    gateway: &'a dyn PaymentGateway,
    pending: Vec<CompensatingAction>,
    results: Vec<CompensationResult>,
}

impl<'a> Saga<'a> {
    pub fn new(name: &'static str, gateway: &'a dyn PaymentGateway) -> Self {
        Self {
            name,
            gateway,
            pending: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Registers the undo action of a step that just succeeded.
    pub fn record(&mut self, action: CompensatingAction) {
        self.pending.push(action);
    }

    /// Runs a cleanup action right away, outside the undo stack. Its outcome
    /// is reported with the saga's results and never fails the saga.
    pub async fn best_effort(&mut self, action: CompensatingAction) -> &CompensationResult {
        let result = execute(self.gateway, action).await;
        self.results.push(result);
        &self.results[self.results.len() - 1]
    }

    /// Undoes every recorded step, newest first.
    pub async fn compensate(&mut self) {
        while let Some(action) = self.pending.pop() {
            let result = execute(self.gateway, action).await;
            self.results.push(result);
        }
    }

    /// Compensates and wraps `cause` with what was undone.
    pub async fn fail(mut self, step: &'static str, cause: AppError) -> AppError {
        log::error!(target: LOG_TARGET, "{} failed at {step}: {cause}", self.name);
        self.compensate().await;
        AppError::SagaFailed {
            step,
            cause: Box::new(cause),
            compensations: self.results,
        }
    }

    /// Completes the saga, dropping the undo stack.
    pub fn finish(self) -> Vec<CompensationResult> {
        self.results
    }
}
