pub mod asaas;
pub mod gateway;
pub mod webhook;

pub use asaas::AsaasClient;
pub use gateway::*;
pub use webhook::{GatewayEvent, PaymentEvent, WebhookPayload};
