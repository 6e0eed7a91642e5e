//! Webhook event publication

use async_trait::async_trait;
use callctl_core::{
    models::{Call, CallEvent},
    traits::EventPublisher,
    AppResult,
};
use serde::Serialize;
use tracing::debug;

use crate::client::PeerClient;

/// Event envelope
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    #[serde(rename = "type")]
    kind: CallEvent,
    publisher: &'static str,
    data: &'a Call,
}

/// Publishes call events to the webhook manager
pub struct HttpEventPublisher {
    client: PeerClient,
}

impl HttpEventPublisher {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish(&self, event: CallEvent, call: &Call) -> AppResult<()> {
        debug!("Publishing {} for call {}", event, call.id);

        self.client
            .post_unit(
                "/v1/events",
                &Envelope {
                    kind: event,
                    publisher: "call-manager",
                    data: call,
                },
            )
            .await
    }
}
