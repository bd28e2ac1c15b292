use crate::database::SubscriptionStore;
use crate::entities::{company_entity, subscription_entity};
use crate::error::{AppError, AppResult};
use uuid::Uuid;

/// Loads a subscription together with its company, refusing callers that do
/// not own the company.
pub async fn load_owned_subscription(
    store: &dyn SubscriptionStore,
    user_id: Uuid,
    subscription_id: i64,
) -> AppResult<(company_entity::Model, subscription_entity::Model)> {
    let subscription = store
        .find_subscription(subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

    let company = store
        .find_company(subscription.company_id)
        .await?
        .ok_or(AppError::PermissionDenied)?;
    if company.owner_user_id != user_id {
        return Err(AppError::PermissionDenied);
    }

    Ok((company, subscription))
}
