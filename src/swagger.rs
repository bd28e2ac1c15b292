use actix_web::web;
use utoipa::OpenApi;
use utoipa::{
    Modify,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::{BillingCycle, BillingMethod, ChangeStatus, SubscriptionStatus};
use crate::external::CreditCard;
use crate::handlers;
use crate::models::*;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            )
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::billing::checkout,
        handlers::billing::upgrade,
        handlers::billing::schedule_downgrade,
        handlers::billing::cancel,
        handlers::billing::sync_status,
        handlers::billing::get_subscription,
        handlers::billing::list_plans,
        handlers::webhook::asaas_webhook,
        handlers::internal::process_scheduled_changes,
    ),
    components(
        schemas(
            BillingCycle,
            BillingMethod,
            SubscriptionStatus,
            ChangeStatus,
            CreditCard,
            CompanyInput,
            AddressInput,
            CheckoutRequest,
            CheckoutResponse,
            PixCharge,
            UpgradeRequest,
            UpgradeResponse,
            ScheduleDowngradeRequest,
            ScheduleDowngradeResponse,
            CancelRequest,
            CancelResponse,
            SyncStatusResponse,
            SubscriptionResponse,
            PlanPriceResponse,
            ChangeOutcome,
            ProcessScheduledChangesResponse,
            WebhookAck,
            ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "billing", description = "Subscription billing API"),
        (name = "webhook", description = "Payment gateway callbacks"),
        (name = "internal", description = "Scheduler entry points"),
    ),
    info(
        title = "Billing Backend API",
        version = "1.0.0",
        description = "Subscription checkout, plan changes and gateway reconciliation"
    ),
    servers(
        (url = "/api/v1", description = "Local server")
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
