//! Signaling event intake
//!
//! The channel adapter posts its events here, one request per event.

use actix_web::{web, HttpResponse};
use callctl_core::AppError;
use callctl_services::{CallHandler, SignalingEvent};
use tracing::{debug, instrument};

/// POST /v1/events
#[instrument(skip(handler, event), fields(event = event.name()))]
pub async fn receive_event(
    handler: web::Data<CallHandler>,
    event: web::Json<SignalingEvent>,
) -> Result<HttpResponse, AppError> {
    debug!("Received signaling event");
    handler.handle_event(event.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure event routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/events", web::post().to(receive_event));
}
