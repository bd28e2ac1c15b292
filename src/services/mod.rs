pub mod cancellation_service;
pub mod checkout_service;
pub mod downgrade_service;
pub mod ownership;
pub mod plan_swap;
pub mod proration;
pub mod query_service;
pub mod saga;
pub mod scheduled_change_service;
pub mod status_sync_service;
pub mod upgrade_service;
pub mod webhook_service;

pub use cancellation_service::*;
pub use checkout_service::*;
pub use downgrade_service::*;
pub use query_service::*;
pub use scheduled_change_service::*;
pub use status_sync_service::*;
pub use upgrade_service::*;
pub use webhook_service::*;
