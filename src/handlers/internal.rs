use crate::config::SchedulerConfig;
use crate::error::AppError;
use crate::models::{ApiResponse, ProcessScheduledChangesResponse};
use crate::services::ScheduledChangeService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use subtle::ConstantTimeEq;

fn cron_secret_matches(req: &HttpRequest, scheduler: &SchedulerConfig) -> bool {
    let expected = scheduler.cron_secret.as_bytes();
    if expected.is_empty() {
        return false;
    }
    req.headers()
        .get("x-cron-secret")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|provided| bool::from(provided.as_bytes().ct_eq(expected)))
}

/// Entry point for an external scheduler.
#[utoipa::path(
    post,
    path = "/internal/billing/process-scheduled-changes",
    tag = "internal",
    params(("x-cron-secret" = String, Header, description = "Scheduler shared secret")),
    responses(
        (status = 200, description = "Due changes processed", body = ProcessScheduledChangesResponse),
        (status = 401, description = "Invalid scheduler secret")
    )
)]
pub async fn process_scheduled_changes(
    req: HttpRequest,
    scheduler: web::Data<SchedulerConfig>,
    scheduled_change_service: web::Data<ScheduledChangeService>,
) -> Result<HttpResponse> {
    if !cron_secret_matches(&req, &scheduler) {
        return Ok(AppError::AuthError("Invalid scheduler secret".to_string()).error_response());
    }

    match scheduled_change_service.process_due().await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn internal_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/internal/billing").route(
        "/process-scheduled-changes",
        web::post().to(process_scheduled_changes),
    ));
}
