//! Call handler
//!
//! Drives calls through their lifecycle:
//! - Action dispatcher with the persisted advancement hold (`action`)
//! - Hangup, failover and cascades to chained calls (`hangup`)
//! - Ringing/progressing transitions (`status`)
//! - DTMF collection (`digit`)
//! - Liveness polling (`health`)
//! - Outbound call construction (`outgoing`)
//! - Inbound/outbound channel start and AMD results (`start`)
//! - Media controls (`media`)
//! - Signaling event routing (`events`)
//!
//! Record mutations follow write, fetch, publish (`db`).

pub mod action;
pub mod db;
pub mod digit;
pub mod events;
pub mod health;
pub mod hangup;
pub mod media;
pub mod outgoing;
pub mod start;
pub mod status;

use callctl_core::{
    models::{Call, CallEvent},
    traits::{
        AmdCache, BillingValidator, BridgeAdapter, CallRepository, ChannelAdapter,
        ConfbridgeService, EventPublisher, GroupcallCoordinator, MediaService, MetricsSink,
        RequestScheduler, RouteService, WorkflowEngine,
    },
    CallSettings,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Collaborators of the call handler
pub struct CallHandlerDeps {
    pub calls: Arc<dyn CallRepository>,
    pub channels: Arc<dyn ChannelAdapter>,
    pub bridges: Arc<dyn BridgeAdapter>,
    pub flow: Arc<dyn WorkflowEngine>,
    pub routes: Arc<dyn RouteService>,
    pub billing: Arc<dyn BillingValidator>,
    pub groupcalls: Arc<dyn GroupcallCoordinator>,
    pub confbridges: Arc<dyn ConfbridgeService>,
    pub media: Arc<dyn MediaService>,
    pub events: Arc<dyn EventPublisher>,
    pub scheduler: Arc<dyn RequestScheduler>,
    pub metrics: Arc<dyn MetricsSink>,
    pub amd: Arc<dyn AmdCache>,
    pub settings: CallSettings,
}

/// Call handler
///
/// Cloning is cheap; every clone shares the collaborators and the tracker of
/// detached tasks.
#[derive(Clone)]
pub struct CallHandler {
    calls: Arc<dyn CallRepository>,
    channels: Arc<dyn ChannelAdapter>,
    bridges: Arc<dyn BridgeAdapter>,
    flow: Arc<dyn WorkflowEngine>,
    routes: Arc<dyn RouteService>,
    billing: Arc<dyn BillingValidator>,
    groupcalls: Arc<dyn GroupcallCoordinator>,
    confbridges: Arc<dyn ConfbridgeService>,
    media: Arc<dyn MediaService>,
    events: Arc<dyn EventPublisher>,
    scheduler: Arc<dyn RequestScheduler>,
    metrics: Arc<dyn MetricsSink>,
    amd: Arc<dyn AmdCache>,
    settings: CallSettings,
    tasks: TaskTracker,
}

impl CallHandler {
    pub fn new(deps: CallHandlerDeps) -> Self {
        Self {
            calls: deps.calls,
            channels: deps.channels,
            bridges: deps.bridges,
            flow: deps.flow,
            routes: deps.routes,
            billing: deps.billing,
            groupcalls: deps.groupcalls,
            confbridges: deps.confbridges,
            media: deps.media,
            events: deps.events,
            scheduler: deps.scheduler,
            metrics: deps.metrics,
            amd: deps.amd,
            settings: deps.settings,
            tasks: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &CallSettings {
        &self.settings
    }

    /// Run `fut` without awaiting it. Completion is observable through [`Self::wait_detached`].
    fn spawn_detached<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(fut);
    }

    /// Wait until every detached task, including ones spawned meanwhile, has finished
    pub async fn wait_detached(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Publish a webhook event. Failures are logged only.
    async fn publish(&self, event: CallEvent, call: &Call) {
        if let Err(e) = self.events.publish(event, call).await {
            warn!("Could not publish {} for call {}: {}", event, call.id, e);
        }
    }
}
