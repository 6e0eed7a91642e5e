//! Peer service clients for callctl
//!
//! HTTP/JSON implementations of the collaborator traits in callctl-core:
//!
//! - Channel and bridge adapter
//! - Workflow engine, route and billing services
//! - Groupcall coordinator and conference manager
//! - Recording, external media and speech synthesis
//! - Webhook publication and the delay service used for timers

pub mod channel;
pub mod client;
pub mod delay;
pub mod flow;
pub mod groupcall;
pub mod media;
pub mod route;
pub mod webhook;

use callctl_core::config::{PeersConfig, ServerConfig};
use callctl_core::AppResult;
use std::sync::Arc;
use tracing::info;

pub use channel::HttpChannelAdapter;
pub use client::PeerClient;
pub use delay::HttpRequestScheduler;
pub use flow::HttpWorkflowEngine;
pub use groupcall::{HttpConfbridgeService, HttpGroupcallCoordinator};
pub use media::HttpMediaService;
pub use route::{HttpBillingValidator, HttpRouteService};
pub use webhook::HttpEventPublisher;

/// Every peer client, built from configuration
pub struct Peers {
    pub channel: Arc<HttpChannelAdapter>,
    pub flow: Arc<HttpWorkflowEngine>,
    pub route: Arc<HttpRouteService>,
    pub billing: Arc<HttpBillingValidator>,
    pub groupcall: Arc<HttpGroupcallCoordinator>,
    pub confbridge: Arc<HttpConfbridgeService>,
    pub media: Arc<HttpMediaService>,
    pub webhook: Arc<HttpEventPublisher>,
    pub scheduler: Arc<HttpRequestScheduler>,
}

impl Peers {
    pub fn from_config(peers: &PeersConfig, server: &ServerConfig) -> AppResult<Self> {
        let t = peers.timeout_ms;

        let built = Self {
            channel: Arc::new(HttpChannelAdapter::new(PeerClient::new(
                "channel",
                &peers.channel_url,
                t,
            )?)),
            flow: Arc::new(HttpWorkflowEngine::new(PeerClient::new(
                "flow",
                &peers.flow_url,
                t,
            )?)),
            route: Arc::new(HttpRouteService::new(PeerClient::new(
                "route",
                &peers.route_url,
                t,
            )?)),
            billing: Arc::new(HttpBillingValidator::new(PeerClient::new(
                "billing",
                &peers.billing_url,
                t,
            )?)),
            groupcall: Arc::new(HttpGroupcallCoordinator::new(PeerClient::new(
                "groupcall",
                &peers.groupcall_url,
                t,
            )?)),
            confbridge: Arc::new(HttpConfbridgeService::new(PeerClient::new(
                "confbridge",
                &peers.confbridge_url,
                t,
            )?)),
            media: Arc::new(HttpMediaService::new(PeerClient::new(
                "media",
                &peers.media_url,
                t,
            )?)),
            webhook: Arc::new(HttpEventPublisher::new(PeerClient::new(
                "webhook",
                &peers.webhook_url,
                t,
            )?)),
            scheduler: Arc::new(HttpRequestScheduler::new(
                PeerClient::new("delay", &peers.delay_url, t)?,
                &server.public_url,
                &peers.channel_url,
            )),
        };

        info!("Peer clients initialized (timeout {}ms)", t);
        Ok(built)
    }
}
