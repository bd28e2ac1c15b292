use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use billing_backend::{
    config::Config,
    database::{SeaOrmStore, SubscriptionStore, create_pool, run_migrations},
    external::{AsaasClient, PaymentGateway},
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().expect("Failed to load configuration");

    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(&config.jwt.secret);

    let store: Arc<dyn SubscriptionStore> = Arc::new(SeaOrmStore::new(pool.clone()));
    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        AsaasClient::new(config.asaas.clone()).expect("Failed to build payment gateway client"),
    );

    let checkout_service = CheckoutService::new(store.clone(), gateway.clone(), &config.billing);
    let upgrade_service = UpgradeService::new(store.clone(), gateway.clone());
    let downgrade_service = DowngradeService::new(store.clone());
    let cancellation_service = CancellationService::new(store.clone(), gateway.clone());
    let status_sync_service = StatusSyncService::new(store.clone(), gateway.clone());
    let query_service = BillingQueryService::new(store.clone());
    let scheduled_change_service = ScheduledChangeService::new(store.clone(), gateway.clone());
    let webhook_service = WebhookService::new(
        store.clone(),
        gateway.clone(),
        config.asaas.webhook_token.clone(),
    );

    if config.scheduler.enabled {
        log::info!(
            "Starting in-process scheduler every {}s",
            config.scheduler.interval_secs
        );
        tasks::spawn_all(
            scheduled_change_service.clone(),
            config.scheduler.interval_secs,
        );
    }

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let scheduler_config = config.scheduler.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors())
            .wrap(Logger::default())
            .app_data(web::Data::new(checkout_service.clone()))
            .app_data(web::Data::new(upgrade_service.clone()))
            .app_data(web::Data::new(downgrade_service.clone()))
            .app_data(web::Data::new(cancellation_service.clone()))
            .app_data(web::Data::new(status_sync_service.clone()))
            .app_data(web::Data::new(query_service.clone()))
            .app_data(web::Data::new(scheduled_change_service.clone()))
            .app_data(web::Data::new(webhook_service.clone()))
            .app_data(web::Data::new(scheduler_config.clone()))
            .configure(swagger_config)
            .configure(handlers::webhook_config)
            .configure(handlers::internal_config)
            .service(web::scope("/api/v1").configure(handlers::billing_config))
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
