use chrono::{DateTime, Duration, Months, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    ToSchema,
    DeriveActiveEnum,
    EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "billing_cycle")]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    #[sea_orm(string_value = "monthly")]
    Monthly,
    #[sea_orm(string_value = "semiannual")]
    Semiannual,
    #[sea_orm(string_value = "yearly")]
    #[serde(alias = "annual")]
    Yearly,
}

impl BillingCycle {
    pub fn months(self) -> u32 {
        match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Semiannual => 6,
            BillingCycle::Yearly => 12,
        }
    }

    /// Cycle name understood by the gateway's subscription API.
    pub fn gateway_cycle(self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Semiannual => "SEMIANNUALLY",
            BillingCycle::Yearly => "YEARLY",
        }
    }

    /// End of a period of this cycle starting at `start`.
    ///
    /// Calendar months are used; a day that does not exist in the target
    /// month is clamped to the month's last day (Jan 31 + 1 month = Feb 28/29).
    pub fn period_end(self, start: DateTime<Utc>) -> DateTime<Utc> {
        start
            .checked_add_months(Months::new(self.months()))
            .unwrap_or_else(|| start + Duration::days(30 * i64::from(self.months())))
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingCycle::Monthly => write!(f, "monthly"),
            BillingCycle::Semiannual => write!(f, "semiannual"),
            BillingCycle::Yearly => write!(f, "yearly"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "plan_prices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub plan_id: String,
    pub cycle: BillingCycle,
    pub amount_cents: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
