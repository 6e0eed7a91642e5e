//! callctl server
//!
//! Call-control plane: receives signaling events from the channel adapter and
//! requests from peer services, and drives every call through its workflow.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use callctl_cache::RedisCache;
use callctl_core::AppConfig;
use callctl_db::{create_pool, run_migrations, PgCallRepository};
use callctl_peers::Peers;
use callctl_services::{CallHandler, CallHandlerDeps, CallMetrics};
use std::env;
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// `LOG_LEVEL` sets the default level, `RUST_LOG` overrides the whole filter
/// and `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "callctl={},callctl_api={},callctl_services={},callctl_db={},callctl_peers={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level, log_level
        ))
    });

    let json = env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

fn io_error(e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting callctl v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().map_err(|e| {
        error!("Invalid configuration: {}", e);
        io_error(e)
    })?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .map_err(io_error)?;
    if config.database.run_migrations {
        run_migrations(&pool).await.map_err(io_error)?;
    }
    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    let amd = RedisCache::new(&config.redis.url)
        .await
        .map_err(io_error)?
        .with_amd_ttl(config.call.amd_cache_ttl_secs);
    amd.ping().await.map_err(io_error)?;
    info!("Redis connection established");

    let peers = Peers::from_config(&config.peers, &config.server).map_err(io_error)?;
    let metrics = Arc::new(CallMetrics::new());

    let handler = CallHandler::new(CallHandlerDeps {
        calls: Arc::new(PgCallRepository::new(pool)),
        channels: peers.channel.clone(),
        bridges: peers.channel.clone(),
        flow: peers.flow.clone(),
        routes: peers.route.clone(),
        billing: peers.billing.clone(),
        groupcalls: peers.groupcall.clone(),
        confbridges: peers.confbridge.clone(),
        media: peers.media.clone(),
        events: peers.webhook.clone(),
        scheduler: peers.scheduler.clone(),
        metrics: metrics.clone(),
        amd: Arc::new(amd),
        settings: config.call.clone(),
    });

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    let app_handler = web::Data::new(handler.clone());
    let app_metrics = web::Data::from(metrics);

    HttpServer::new(move || {
        App::new()
            .app_data(app_handler.clone())
            .app_data(app_metrics.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_json",
                        "message": error_message
                    })),
                )
                .into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                let error_message = err.to_string();
                actix_web::error::InternalError::from_response(
                    err,
                    HttpResponse::BadRequest().json(serde_json::json!({
                        "error": "invalid_query",
                        "message": error_message
                    })),
                )
                .into()
            }))
            // Middleware
            .wrap(Cors::permissive())
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(callctl_api::configure)
    })
    .workers(config.server.workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped. Waiting for detached call tasks.");
    handler.wait_detached().await;

    Ok(())
}
