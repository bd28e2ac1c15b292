use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

use crate::m20251001_000002_create_subscriptions::Subscriptions;

#[derive(DeriveIden)]
enum SubscriptionChanges {
    Table,
    Id,
    SubscriptionId,
    CompanyId,
    ChangeType,
    ToPlanId,
    ToCycle,
    BillingMethod,
    ProrationCents,
    EffectiveAt,
    Status,
    GatewayPaymentId,
    CardToken,
    FailureReason,
    ProcessedAt,
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
                    .as_enum(Alias::new("subscription_change_type"))
                    .values(vec![Alias::new("upgrade"), Alias::new("downgrade")])
                    .to_owned(),
            )
            .await?;
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("subscription_change_status"))
                    .values(vec![
                        Alias::new("scheduled"),
                        Alias::new("processing"),
                        Alias::new("done"),
                        Alias::new("failed"),
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SubscriptionChanges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionChanges::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::SubscriptionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::CompanyId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::ChangeType)
                            .custom(Alias::new("subscription_change_type"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::ToPlanId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::ToCycle)
                            .custom(Alias::new("billing_cycle"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::BillingMethod)
                            .custom(Alias::new("billing_method"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::ProrationCents)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::EffectiveAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::Status)
                            .custom(Alias::new("subscription_change_status"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::GatewayPaymentId)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(SubscriptionChanges::CardToken).string().null())
                    .col(ColumnDef::new(SubscriptionChanges::FailureReason).text().null())
                    .col(
                        ColumnDef::new(SubscriptionChanges::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionChanges::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_changes_subscription")
                            .from(
                                SubscriptionChanges::Table,
                                SubscriptionChanges::SubscriptionId,
                            )
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscription_changes_due")
                    .table(SubscriptionChanges::Table)
                    .col(SubscriptionChanges::Status)
                    .col(SubscriptionChanges::EffectiveAt)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subscription_changes_payment")
                    .table(SubscriptionChanges::Table)
                    .col(SubscriptionChanges::GatewayPaymentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .if_exists()
                    .table(SubscriptionChanges::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_type(
                Type::drop()
                    .name(Alias::new("subscription_change_status"))
                    .to_owned(),
            )
            .await?;
        manager
            .drop_type(
                Type::drop()
                    .name(Alias::new("subscription_change_type"))
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}
