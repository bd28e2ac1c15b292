use crate::error::AppError;
use crate::models::WebhookAck;
use crate::services::WebhookService;
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};
use log::{info, warn};

const TOKEN_HEADERS: [&str; 2] = ["asaas-access-token", "x-asaas-access-token"];

/// Asaas webhook receiver.
///
/// Replies 200 once the event is logged, even if applying it failed, so the
/// gateway does not redeliver an event that is already recorded. Transient
/// failures answer 5xx so the gateway delivers the event again.
#[utoipa::path(
    post,
    path = "/webhook/asaas",
    tag = "webhook",
    responses(
        (status = 200, description = "Event received", body = WebhookAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Invalid webhook token"),
        (status = 500, description = "Temporary failure, event will be redelivered")
    )
)]
pub async fn asaas_webhook(
    req: HttpRequest,
    body: web::Bytes,
    webhook_service: web::Data<WebhookService>,
) -> Result<HttpResponse> {
    let token = TOKEN_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|value| value.to_str().ok());
    if !webhook_service.verify_token(token) {
        warn!("Rejected webhook with invalid token");
        return Ok(AppError::AuthError("Invalid webhook token".to_string()).error_response());
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            return Ok(
                AppError::ValidationError(format!("Invalid webhook payload: {e}"))
                    .error_response(),
            );
        }
    };

    match webhook_service.ingest(payload).await {
        Ok(ack) => {
            info!(
                "Webhook handled (duplicate: {}, error: {})",
                ack.duplicate,
                ack.error.is_some()
            );
            Ok(HttpResponse::Ok().json(ack))
        }
        Err(e) => Ok(e.error_response()),
    }
}

pub fn webhook_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhook").route("/asaas", web::post().to(asaas_webhook)));
}
