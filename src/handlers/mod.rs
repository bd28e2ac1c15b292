pub mod billing;
pub mod internal;
pub mod webhook;

pub use billing::billing_config;
pub use internal::internal_config;
pub use webhook::webhook_config;
