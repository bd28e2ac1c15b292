use super::store::{
    NewCompany, NewGatewayEvent, NewSubscription, NewSubscriptionChange, PaymentUpsert,
    SubscriptionPatch, SubscriptionStore,
};
use crate::entities::{
    BillingCycle, ChangeStatus, PaymentStatus, SubscriptionStatus, company_entity as company,
    gateway_event_entity as gateway_event, payment_entity as payment,
    plan_price_entity as plan_price, subscription_change_entity as change,
    subscription_entity as subscription,
};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use uuid::Uuid;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct SeaOrmStore {
    pool: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(err: DbErr, message: &str) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            log::warn!("Unique constraint violated: {detail}");
            AppError::ConcurrentModification(message.to_string())
        }
        _ => AppError::DatabaseError(err),
    }
}

#[async_trait]
impl SubscriptionStore for SeaOrmStore {
    async fn find_company(&self, id: i64) -> AppResult<Option<company::Model>> {
        Ok(company::Entity::find_by_id(id).one(&self.pool).await?)
    }

    async fn find_company_by_owner(&self, owner_user_id: Uuid) -> AppResult<Option<company::Model>> {
        Ok(company::Entity::find()
            .filter(company::Column::OwnerUserId.eq(owner_user_id))
            .one(&self.pool)
            .await?)
    }

    async fn insert_company(&self, new: NewCompany) -> AppResult<company::Model> {
        let now = Utc::now();
        let am = company::ActiveModel {
            owner_user_id: Set(new.owner_user_id),
            legal_name: Set(new.legal_name),
            tax_id: Set(new.tax_id),
            email: Set(new.email),
            phone: Set(new.phone),
            postal_code: Set(new.postal_code),
            address_number: Set(new.address_number),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        am.insert(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "Company already exists for this user"))
    }

    async fn find_plan_price(
        &self,
        plan_id: &str,
        cycle: BillingCycle,
    ) -> AppResult<Option<plan_price::Model>> {
        Ok(plan_price::Entity::find()
            .filter(plan_price::Column::PlanId.eq(plan_id))
            .filter(plan_price::Column::Cycle.eq(cycle))
            .one(&self.pool)
            .await?)
    }

    async fn list_plan_prices(&self) -> AppResult<Vec<plan_price::Model>> {
        Ok(plan_price::Entity::find()
            .order_by_asc(plan_price::Column::PlanId)
            .order_by_asc(plan_price::Column::AmountCents)
            .all(&self.pool)
            .await?)
    }

    async fn insert_subscription(&self, new: NewSubscription) -> AppResult<subscription::Model> {
        let now = Utc::now();
        let am = subscription::ActiveModel {
            company_id: Set(new.company_id),
            plan_id: Set(new.plan_id),
            cycle: Set(new.cycle),
            billing_method: Set(new.billing_method),
            status: Set(new.status),
            trial_ends_at: Set(new.trial_ends_at),
            current_period_start: Set(new.current_period_start),
            current_period_end: Set(new.current_period_end),
            access_until: Set(new.access_until),
            gateway_customer_id: Set(new.gateway_customer_id),
            gateway_subscription_id: Set(new.gateway_subscription_id),
            card_token: Set(new.card_token),
            cancel_at_period_end: Set(false),
            version: Set(0),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        am.insert(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, "Company already has a live subscription"))
    }

    async fn find_subscription(&self, id: i64) -> AppResult<Option<subscription::Model>> {
        Ok(subscription::Entity::find_by_id(id).one(&self.pool).await?)
    }

    async fn find_subscription_by_gateway_id(
        &self,
        gateway_subscription_id: &str,
    ) -> AppResult<Option<subscription::Model>> {
        Ok(subscription::Entity::find()
            .filter(subscription::Column::GatewaySubscriptionId.eq(gateway_subscription_id))
            .one(&self.pool)
            .await?)
    }

    async fn find_live_subscription_for_company(
        &self,
        company_id: i64,
    ) -> AppResult<Option<subscription::Model>> {
        Ok(subscription::Entity::find()
            .filter(subscription::Column::CompanyId.eq(company_id))
            .filter(subscription::Column::Status.ne(SubscriptionStatus::Canceled))
            .order_by_desc(subscription::Column::Id)
            .one(&self.pool)
            .await?)
    }

    async fn update_subscription(
        &self,
        id: i64,
        expected_version: i32,
        patch: SubscriptionPatch,
    ) -> AppResult<subscription::Model> {
        let mut am = subscription::ActiveModel {
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        if let Some(v) = patch.plan_id {
            am.plan_id = Set(v);
        }
        if let Some(v) = patch.cycle {
            am.cycle = Set(v);
        }
        if let Some(v) = patch.billing_method {
            am.billing_method = Set(v);
        }
        if let Some(v) = patch.status {
            am.status = Set(v);
        }
        if let Some(v) = patch.current_period_start {
            am.current_period_start = Set(v);
        }
        if let Some(v) = patch.current_period_end {
            am.current_period_end = Set(v);
        }
        if let Some(v) = patch.access_until {
            am.access_until = Set(v);
        }
        if let Some(v) = patch.gateway_subscription_id {
            am.gateway_subscription_id = Set(Some(v));
        }
        if let Some(v) = patch.card_token {
            am.card_token = Set(Some(v));
        }
        if let Some(v) = patch.cancel_at_period_end {
            am.cancel_at_period_end = Set(v);
        }
        if let Some(v) = patch.canceled_at {
            am.canceled_at = Set(Some(v));
        }
        if let Some(v) = patch.last_synced_at {
            am.last_synced_at = Set(Some(v));
        }
        if let Some(v) = patch.last_gateway_event_at {
            am.last_gateway_event_at = Set(Some(v));
        }

        // compare-and-set on the version column
        let result = subscription::Entity::update_many()
            .set(am)
            .col_expr(
                subscription::Column::Version,
                Expr::col(subscription::Column::Version).add(1),
            )
            .filter(subscription::Column::Id.eq(id))
            .filter(subscription::Column::Version.eq(expected_version))
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            return match subscription::Entity::find_by_id(id).one(&self.pool).await? {
                Some(current) => {
                    log::warn!(
                        "Stale update of subscription {id}: expected version {expected_version}, found {}",
                        current.version
                    );
                    Err(AppError::ConcurrentModification(format!(
                        "Subscription {id} was modified concurrently"
                    )))
                }
                None => Err(AppError::NotFound("Subscription not found".to_string())),
            };
        }

        subscription::Entity::find_by_id(id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))
    }

    async fn list_cancellations_due(&self, now: DateTime<Utc>) -> AppResult<Vec<subscription::Model>> {
        Ok(subscription::Entity::find()
            .filter(subscription::Column::Status.eq(SubscriptionStatus::CancelRequested))
            .filter(subscription::Column::AccessUntil.lte(now))
            .order_by_asc(subscription::Column::AccessUntil)
            .all(&self.pool)
            .await?)
    }

    async fn insert_change(&self, new: NewSubscriptionChange) -> AppResult<change::Model> {
        let now = Utc::now();
        let am = change::ActiveModel {
            subscription_id: Set(new.subscription_id),
            company_id: Set(new.company_id),
            change_type: Set(new.change_type),
            to_plan_id: Set(new.to_plan_id),
            to_cycle: Set(new.to_cycle),
            billing_method: Set(new.billing_method),
            proration_cents: Set(new.proration_cents),
            effective_at: Set(new.effective_at),
            status: Set(new.status),
            gateway_payment_id: Set(new.gateway_payment_id),
            card_token: Set(new.card_token),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        Ok(am.insert(&self.pool).await?)
    }

    async fn find_change_by_payment_id(
        &self,
        gateway_payment_id: &str,
    ) -> AppResult<Option<change::Model>> {
        Ok(change::Entity::find()
            .filter(change::Column::GatewayPaymentId.eq(gateway_payment_id))
            .order_by_desc(change::Column::Id)
            .one(&self.pool)
            .await?)
    }

    async fn find_open_changes(&self, subscription_id: i64) -> AppResult<Vec<change::Model>> {
        Ok(change::Entity::find()
            .filter(change::Column::SubscriptionId.eq(subscription_id))
            .filter(
                change::Column::Status.is_in([ChangeStatus::Scheduled, ChangeStatus::Processing]),
            )
            .order_by_asc(change::Column::Id)
            .all(&self.pool)
            .await?)
    }

    async fn list_due_changes(&self, now: DateTime<Utc>) -> AppResult<Vec<change::Model>> {
        Ok(change::Entity::find()
            .filter(change::Column::Status.eq(ChangeStatus::Scheduled))
            .filter(change::Column::EffectiveAt.lte(now))
            .order_by_asc(change::Column::EffectiveAt)
            .order_by_asc(change::Column::Id)
            .all(&self.pool)
            .await?)
    }

    async fn transition_change(
        &self,
        id: i64,
        from: ChangeStatus,
        to: ChangeStatus,
        failure_reason: Option<String>,
        processed_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut am = change::ActiveModel {
            status: Set(to),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        if let Some(reason) = failure_reason {
            am.failure_reason = Set(Some(reason));
        }
        if let Some(at) = processed_at {
            am.processed_at = Set(Some(at));
        }

        let result = change::Entity::update_many()
            .set(am)
            .filter(change::Column::Id.eq(id))
            .filter(change::Column::Status.eq(from))
            .exec(&self.pool)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn upsert_payment(&self, upsert: PaymentUpsert) -> AppResult<payment::Model> {
        let now = Utc::now();

        if let Some(existing) = self.find_payment(&upsert.gateway_payment_id).await? {
            let mut merged = existing;
            upsert.merge_into(&mut merged);
            let mut am = merged.into_active_model().reset_all();
            am.updated_at = Set(Some(now));
            return Ok(am.update(&self.pool).await?);
        }

        let am = payment::ActiveModel {
            gateway_payment_id: Set(upsert.gateway_payment_id.clone()),
            subscription_id: Set(upsert.subscription_id),
            company_id: Set(upsert.company_id),
            billing_method: Set(upsert.billing_method),
            amount_cents: Set(upsert.amount_cents),
            status: Set(upsert.status),
            due_date: Set(upsert.due_date),
            paid_at: Set(upsert.paid_at),
            pix_qr_code: Set(upsert.pix_qr_code),
            pix_payload: Set(upsert.pix_payload),
            invoice_url: Set(upsert.invoice_url),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        // a concurrent insert for the same gateway payment only refreshes status
        payment::Entity::insert(am)
            .on_conflict(
                OnConflict::column(payment::Column::GatewayPaymentId)
                    .update_columns([
                        payment::Column::Status,
                        payment::Column::PaidAt,
                        payment::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.pool)
            .await?;

        self.find_payment(&upsert.gateway_payment_id)
            .await?
            .ok_or_else(|| AppError::InternalError("Payment vanished after upsert".to_string()))
    }

    async fn find_payment(&self, gateway_payment_id: &str) -> AppResult<Option<payment::Model>> {
        Ok(payment::Entity::find()
            .filter(payment::Column::GatewayPaymentId.eq(gateway_payment_id))
            .one(&self.pool)
            .await?)
    }

    async fn update_payment_status(
        &self,
        gateway_payment_id: &str,
        status: PaymentStatus,
    ) -> AppResult<bool> {
        let am = payment::ActiveModel {
            status: Set(status),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        let result = payment::Entity::update_many()
            .set(am)
            .filter(payment::Column::GatewayPaymentId.eq(gateway_payment_id))
            .exec(&self.pool)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn confirm_payment(
        &self,
        gateway_payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let am = payment::ActiveModel {
            status: Set(PaymentStatus::Confirmed),
            paid_at: Set(Some(paid_at)),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        let result = payment::Entity::update_many()
            .set(am)
            .filter(payment::Column::GatewayPaymentId.eq(gateway_payment_id))
            .filter(payment::Column::Status.ne(PaymentStatus::Confirmed))
            .exec(&self.pool)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn gateway_event_exists(&self, event_id: &str) -> AppResult<bool> {
        Ok(gateway_event::Entity::find()
            .filter(gateway_event::Column::EventId.eq(event_id))
            .one(&self.pool)
            .await?
            .is_some())
    }

    async fn record_gateway_event(&self, event: NewGatewayEvent) -> AppResult<bool> {
        let am = gateway_event::ActiveModel {
            event_id: Set(event.event_id),
            event_type: Set(event.event_type),
            payload: Set(event.payload),
            received_at: Set(Utc::now()),
            ..Default::default()
        };
        let inserted = gateway_event::Entity::insert(am)
            .on_conflict(
                OnConflict::column(gateway_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.pool)
            .await?;
        Ok(inserted > 0)
    }

    async fn release_gateway_event(&self, event_id: &str) -> AppResult<()> {
        gateway_event::Entity::delete_many()
            .filter(gateway_event::Column::EventId.eq(event_id))
            .exec(&self.pool)
            .await?;
        Ok(())
    }
}
