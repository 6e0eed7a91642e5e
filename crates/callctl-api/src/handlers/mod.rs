//! HTTP request handlers

pub mod calls;
pub mod events;
pub mod system;

use actix_web::web;

pub use calls::configure as configure_calls;
pub use events::configure as configure_events;
pub use system::configure as configure_system;

/// Mount every route under `/v1`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            .configure(configure_system)
            .configure(configure_events)
            .configure(configure_calls),
    );
}
