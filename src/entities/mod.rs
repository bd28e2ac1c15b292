pub mod companies;
pub mod gateway_events;
pub mod payments;
pub mod plan_prices;
pub mod subscription_changes;
pub mod subscriptions;

pub use companies as company_entity;
pub use gateway_events as gateway_event_entity;
pub use payments as payment_entity;
pub use plan_prices as plan_price_entity;
pub use subscription_changes as subscription_change_entity;
pub use subscriptions as subscription_entity;

pub use payments::PaymentStatus;
pub use plan_prices::BillingCycle;
pub use subscription_changes::{ChangeStatus, ChangeType};
pub use subscriptions::{BillingMethod, SubscriptionStatus};
