use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

use crate::m20251001_000001_create_companies_and_plan_prices::Companies;

#[derive(DeriveIden)]
pub(crate) enum Subscriptions {
    Table,
    Id,
    CompanyId,
    PlanId,
    Cycle,
    BillingMethod,
    Status,
    TrialEndsAt,
    CurrentPeriodStart,
    CurrentPeriodEnd,
    AccessUntil,
    GatewayCustomerId,
    GatewaySubscriptionId,
    CardToken,
    CancelAtPeriodEnd,
    CanceledAt,
    LastSyncedAt,
    LastGatewayEventAt,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("billing_method"))
                    .values(vec![Alias::new("pix"), Alias::new("credit_card")])
                    .to_owned(),
            )
            .await?;
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("subscription_status"))
                    .values(vec![
                        Alias::new("trialing"),
                        Alias::new("active"),
                        Alias::new("overdue"),
                        Alias::new("cancel_requested"),
                        Alias::new("canceled"),
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscriptions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CompanyId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Subscriptions::PlanId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(Subscriptions::Cycle)
                            .custom(Alias::new("billing_cycle"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::BillingMethod)
                            .custom(Alias::new("billing_method"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::Status)
                            .custom(Alias::new("subscription_status"))
                            .not_null()
                            .default(Expr::cust("'trialing'::subscription_status")),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::TrialEndsAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CurrentPeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CurrentPeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::AccessUntil)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::GatewayCustomerId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::GatewaySubscriptionId)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(Subscriptions::CardToken).string().null())
                    .col(
                        ColumnDef::new(Subscriptions::CancelAtPeriodEnd)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CanceledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::LastGatewayEventAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscriptions_company")
                            .from(Subscriptions::Table, Subscriptions::CompanyId)
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscriptions_gateway_subscription")
                    .table(Subscriptions::Table)
                    .col(Subscriptions::GatewaySubscriptionId)
                    .to_owned(),
            )
            .await?;

        // at most one live subscription per company
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_subscriptions_live_company \
                 ON subscriptions (company_id) WHERE status <> 'canceled'",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(Subscriptions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("subscription_status")).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("billing_method")).to_owned())
            .await?;
        Ok(())
    }
}
