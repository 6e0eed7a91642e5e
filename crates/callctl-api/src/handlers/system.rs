//! Service health and metrics

use actix_web::{web, HttpResponse};
use callctl_services::CallMetrics;

/// GET /v1/health
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "callctl",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Prometheus text exposition
///
/// GET /v1/metrics
pub async fn metrics(metrics: web::Data<CallMetrics>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics.render())
}

/// Configure system routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics));
}
