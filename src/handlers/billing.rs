use crate::middlewares::current_user_id;
use crate::models::*;
use crate::services::{
    BillingQueryService, CancellationService, CheckoutService, DowngradeService,
    StatusSyncService, UpgradeService,
};
use actix_web::{HttpRequest, HttpResponse, ResponseError, Result, web};

#[utoipa::path(
    post,
    path = "/billing/checkout",
    tag = "billing",
    request_body = CheckoutRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trial subscription created", body = CheckoutResponse),
        (status = 400, description = "Invalid company data, plan or card"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn checkout(
    checkout_service: web::Data<CheckoutService>,
    req: HttpRequest,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse> {
    let user_id = match current_user_id(&req) {
        Ok(id) => id,
        Err(e) => return Ok(e.error_response()),
    };

    match checkout_service.checkout(user_id, body.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/billing/upgrade",
    tag = "billing",
    request_body = UpgradeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Upgrade charged or applied", body = UpgradeResponse),
        (status = 400, description = "Invalid target plan or payment data"),
        (status = 403, description = "Subscription belongs to another company"),
        (status = 409, description = "Subscription changed concurrently")
    )
)]
pub async fn upgrade(
    upgrade_service: web::Data<UpgradeService>,
    req: HttpRequest,
    body: web::Json<UpgradeRequest>,
) -> Result<HttpResponse> {
    let user_id = match current_user_id(&req) {
        Ok(id) => id,
        Err(e) => return Ok(e.error_response()),
    };

    match upgrade_service.upgrade(user_id, body.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/billing/schedule-downgrade",
    tag = "billing",
    request_body = ScheduleDowngradeRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Downgrade scheduled for the end of the period", body = ScheduleDowngradeResponse),
        (status = 400, description = "Invalid target plan"),
        (status = 403, description = "Subscription belongs to another company")
    )
)]
pub async fn schedule_downgrade(
    downgrade_service: web::Data<DowngradeService>,
    req: HttpRequest,
    body: web::Json<ScheduleDowngradeRequest>,
) -> Result<HttpResponse> {
    let user_id = match current_user_id(&req) {
        Ok(id) => id,
        Err(e) => return Ok(e.error_response()),
    };

    match downgrade_service.schedule(user_id, body.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/billing/cancel",
    tag = "billing",
    request_body = CancelRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Cancellation requested", body = CancelResponse),
        (status = 400, description = "Already canceled"),
        (status = 403, description = "Subscription belongs to another company")
    )
)]
pub async fn cancel(
    cancellation_service: web::Data<CancellationService>,
    req: HttpRequest,
    body: web::Json<CancelRequest>,
) -> Result<HttpResponse> {
    let user_id = match current_user_id(&req) {
        Ok(id) => id,
        Err(e) => return Ok(e.error_response()),
    };

    match cancellation_service.cancel(user_id, body.into_inner()).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/billing/sync-status",
    tag = "billing",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Status reconciled with the gateway", body = SyncStatusResponse),
        (status = 404, description = "No live subscription")
    )
)]
pub async fn sync_status(
    status_sync_service: web::Data<StatusSyncService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = match current_user_id(&req) {
        Ok(id) => id,
        Err(e) => return Ok(e.error_response()),
    };

    match status_sync_service.sync(user_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/billing/subscription",
    tag = "billing",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Caller's live subscription", body = SubscriptionResponse),
        (status = 404, description = "No live subscription")
    )
)]
pub async fn get_subscription(
    query_service: web::Data<BillingQueryService>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let user_id = match current_user_id(&req) {
        Ok(id) => id,
        Err(e) => return Ok(e.error_response()),
    };

    match query_service.current_subscription(user_id).await {
        Ok(response) => Ok(HttpResponse::Ok().json(ApiResponse::success(response))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/billing/plans",
    tag = "billing",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Plan catalog", body = Vec<PlanPriceResponse>)
    )
)]
pub async fn list_plans(query_service: web::Data<BillingQueryService>) -> Result<HttpResponse> {
    match query_service.list_plans().await {
        Ok(plans) => Ok(HttpResponse::Ok().json(ApiResponse::success(plans))),
        Err(e) => Ok(e.error_response()),
    }
}

pub fn billing_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/billing")
            .route("/checkout", web::post().to(checkout))
            .route("/upgrade", web::post().to(upgrade))
            .route("/schedule-downgrade", web::post().to(schedule_downgrade))
            .route("/cancel", web::post().to(cancel))
            .route("/sync-status", web::post().to(sync_status))
            .route("/subscription", web::get().to(get_subscription))
            .route("/plans", web::get().to(list_plans)),
    );
}
