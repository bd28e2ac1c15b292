pub use sea_orm_migration::prelude::*;

mod m20251001_000001_create_companies_and_plan_prices;
mod m20251001_000002_create_subscriptions;
mod m20251001_000003_create_subscription_changes;
mod m20251001_000004_create_payments_and_gateway_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251001_000001_create_companies_and_plan_prices::Migration),
            Box::new(m20251001_000002_create_subscriptions::Migration),
            Box::new(m20251001_000003_create_subscription_changes::Migration),
            Box::new(m20251001_000004_create_payments_and_gateway_events::Migration),
        ]
    }
}
