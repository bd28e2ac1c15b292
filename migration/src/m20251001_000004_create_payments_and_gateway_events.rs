use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

use crate::m20251001_000002_create_subscriptions::Subscriptions;

#[derive(DeriveIden)]
enum Payments {
    Table,
    Id,
    GatewayPaymentId,
    SubscriptionId,
    CompanyId,
    BillingMethod,
    AmountCents,
    Status,
    DueDate,
    PaidAt,
    PixQrCode,
    PixPayload,
    InvoiceUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GatewayEvents {
    Table,
    Id,
    EventId,
    EventType,
    Payload,
    ReceivedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("payment_status"))
                    .values(vec![
                        Alias::new("pending"),
                        Alias::new("confirmed"),
                        Alias::new("overdue"),
                        Alias::new("refunded"),
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Payments::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Payments::GatewayPaymentId)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Payments::SubscriptionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::CompanyId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::BillingMethod)
                            .custom(Alias::new("billing_method"))
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::AmountCents).big_integer().not_null())
                    .col(
                        ColumnDef::new(Payments::Status)
                            .custom(Alias::new("payment_status"))
                            .not_null(),
                    )
                    .col(ColumnDef::new(Payments::DueDate).date().null())
                    .col(
                        ColumnDef::new(Payments::PaidAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Payments::PixQrCode).text().null())
                    .col(ColumnDef::new(Payments::PixPayload).text().null())
                    .col(ColumnDef::new(Payments::InvoiceUrl).string().null())
                    .col(
                        ColumnDef::new(Payments::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_payments_subscription")
                            .from(Payments::Table, Payments::SubscriptionId)
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // append-only idempotency log
        manager
            .create_table(
                Table::create()
                    .table(GatewayEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GatewayEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GatewayEvents::EventId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(GatewayEvents::EventType).string_len(64).not_null())
                    .col(ColumnDef::new(GatewayEvents::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(GatewayEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .not_null(),
                    )
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
                    .table(GatewayEvents::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("payment_status")).to_owned())
            .await?;
        Ok(())
    }
}
