use sea_orm_migration::prelude::extension::postgres::Type;
use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Companies {
    Table,
    Id,
    OwnerUserId,
    LegalName,
    TaxId,
    Email,
    Phone,
    PostalCode,
    AddressNumber,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlanPrices {
    Table,
    Id,
    PlanId,
    Cycle,
    AmountCents,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(Alias::new("billing_cycle"))
                    .values(vec![
                        Alias::new("monthly"),
                        Alias::new("semiannual"),
                        Alias::new("yearly"),
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Companies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Companies::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    // one company per owning user
                    .col(
                        ColumnDef::new(Companies::OwnerUserId)
                            .uuid()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Companies::LegalName).string().not_null())
                    .col(ColumnDef::new(Companies::TaxId).string_len(14).not_null())
                    .col(ColumnDef::new(Companies::Email).string().not_null())
                    .col(ColumnDef::new(Companies::Phone).string_len(32).null())
                    .col(ColumnDef::new(Companies::PostalCode).string_len(16).null())
                    .col(ColumnDef::new(Companies::AddressNumber).string_len(32).null())
                    .col(
                        ColumnDef::new(Companies::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Companies::UpdatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlanPrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlanPrices::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PlanPrices::PlanId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(PlanPrices::Cycle)
                            .custom(Alias::new("billing_cycle"))
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlanPrices::AmountCents)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlanPrices::CreatedAt)
                            .timestamp_with_time_zone()
                            .default(Expr::cust("NOW()"))
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_plan_prices_plan_cycle")
                    .table(PlanPrices::Table)
                    .col(PlanPrices::PlanId)
                    .col(PlanPrices::Cycle)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().if_exists().table(PlanPrices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().if_exists().table(Companies::Table).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(Alias::new("billing_cycle")).to_owned())
            .await?;
        Ok(())
    }
}
