//! Delayed request scheduling
//!
//! Timers are handed to an external delay service which replays the request
//! against our RPC surface (or the channel adapter) once the delay elapses.

use async_trait::async_trait;
use callctl_core::{
    models::{Action, ChannelCause},
    traits::RequestScheduler,
    AppResult,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::client::PeerClient;

/// Request replayed by the delay service
#[derive(Debug, Serialize)]
struct DelayedRequest<'a> {
    delay_ms: i64,
    method: &'static str,
    url: String,
    body: &'a Value,
}

/// Schedules requests through the delay service
pub struct HttpRequestScheduler {
    client: PeerClient,
    /// Public root of our own RPC surface
    callback_url: String,
    /// Root of the channel adapter
    channel_url: String,
}

impl HttpRequestScheduler {
    pub fn new(client: PeerClient, callback_url: &str, channel_url: &str) -> Self {
        Self {
            client,
            callback_url: callback_url.trim_end_matches('/').to_string(),
            channel_url: channel_url.trim_end_matches('/').to_string(),
        }
    }

    async fn schedule(&self, delay_ms: i64, url: String, body: Value) -> AppResult<()> {
        debug!("Scheduling POST {} in {}ms", url, delay_ms);

        self.client
            .post_unit(
                "/v1/delays",
                &DelayedRequest {
                    delay_ms: delay_ms.max(0),
                    method: "POST",
                    url,
                    body: &body,
                },
            )
            .await
    }

    fn call_url(&self, call_id: Uuid, op: &str) -> String {
        format!("{}/v1/calls/{}/{}", self.callback_url, call_id, op)
    }
}

#[async_trait]
impl RequestScheduler for HttpRequestScheduler {
    #[instrument(skip(self))]
    async fn action_next(&self, call_id: Uuid, force: bool) -> AppResult<()> {
        self.schedule(0, self.call_url(call_id, "action-next"), json!({ "force": force }))
            .await
    }

    #[instrument(skip(self, action), fields(action_id = %action.id))]
    async fn action_timeout(&self, call_id: Uuid, delay_ms: i64, action: &Action) -> AppResult<()> {
        self.schedule(
            delay_ms,
            self.call_url(call_id, "action-timeout"),
            json!({ "action": action }),
        )
        .await
    }

    async fn health_check(&self, call_id: Uuid, delay_ms: i64, retry_count: u32) -> AppResult<()> {
        self.schedule(
            delay_ms,
            self.call_url(call_id, "health-check"),
            json!({ "retry_count": retry_count }),
        )
        .await
    }

    async fn channel_hangup(
        &self,
        channel_id: &str,
        cause: ChannelCause,
        delay_ms: i64,
    ) -> AppResult<()> {
        self.schedule(
            delay_ms,
            format!("{}/v1/channels/{}/hangup", self.channel_url, channel_id),
            json!({ "cause": cause }),
        )
        .await
    }
}
