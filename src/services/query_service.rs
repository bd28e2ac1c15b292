use crate::database::SubscriptionStore;
use crate::error::{AppError, AppResult};
use crate::models::{PlanPriceResponse, SubscriptionResponse};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct BillingQueryService {
    store: Arc<dyn SubscriptionStore>,
}

impl BillingQueryService {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn current_subscription(&self, user_id: Uuid) -> AppResult<SubscriptionResponse> {
        let company = self
            .store
            .find_company_by_owner(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Company not found".to_string()))?;
        self.store
            .find_live_subscription_for_company(company.id)
            .await?
            .map(SubscriptionResponse::from)
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    pub async fn list_plans(&self) -> AppResult<Vec<PlanPriceResponse>> {
        let prices = self.store.list_plan_prices().await?;
        Ok(prices.into_iter().map(PlanPriceResponse::from).collect())
    }
}
