use super::{BillingCycle, BillingMethod};
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "subscription_change_type"
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    #[sea_orm(string_value = "upgrade")]
    Upgrade,
    #[sea_orm(string_value = "downgrade")]
    Downgrade,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Upgrade => write!(f, "upgrade"),
            ChangeType::Downgrade => write!(f, "downgrade"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(
    rs_type = "String",
    db_type = "Enum",
    enum_name = "subscription_change_status"
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "done")]
    Done,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl ChangeStatus {
    pub fn is_open(self) -> bool {
        matches!(self, ChangeStatus::Scheduled | ChangeStatus::Processing)
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeStatus::Scheduled => write!(f, "scheduled"),
            ChangeStatus::Processing => write!(f, "processing"),
            ChangeStatus::Done => write!(f, "done"),
            ChangeStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "subscription_changes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub subscription_id: i64,
    pub company_id: i64,
    pub change_type: ChangeType,
    pub to_plan_id: String,
    pub to_cycle: BillingCycle,
    pub billing_method: BillingMethod,
    pub proration_cents: Option<i64>,
    pub effective_at: DateTime<Utc>,
    pub status: ChangeStatus,
    pub gateway_payment_id: Option<String>,
    pub card_token: Option<String>,
    pub failure_reason: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
