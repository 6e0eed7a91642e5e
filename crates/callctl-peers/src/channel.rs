//! Channel and bridge adapter client

use async_trait::async_trait;
use callctl_core::{
    models::{Channel, ChannelCause, MuteDirection},
    traits::{BridgeAdapter, ChannelAdapter, ChannelCreateRequest},
    AppResult,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::client::PeerClient;

#[derive(Debug, Serialize)]
struct DialplanTarget<'a> {
    context: &'a str,
    exten: &'a str,
    priority: i32,
}

#[derive(Debug, Deserialize)]
struct BridgeCreated {
    id: String,
}

/// HTTP client of the channel adapter service
pub struct HttpChannelAdapter {
    client: PeerClient,
}

impl HttpChannelAdapter {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }

    async fn toggle(&self, id: &str, feature: &str, on: bool) -> AppResult<()> {
        let path = format!("/v1/channels/{}/{}", id, feature);
        if on {
            self.client.post_unit(&path, &json!({})).await
        } else {
            self.client.delete_unit(&path).await
        }
    }
}

#[async_trait]
impl ChannelAdapter for HttpChannelAdapter {
    async fn channel_get(&self, id: &str) -> AppResult<Channel> {
        self.client.get(&format!("/v1/channels/{}", id)).await
    }

    #[instrument(skip(self, req), fields(channel_id = %req.channel_id))]
    async fn channel_create(&self, req: &ChannelCreateRequest) -> AppResult<Channel> {
        self.client.post("/v1/channels", req).await
    }

    async fn channel_hangup(&self, id: &str, cause: ChannelCause) -> AppResult<Channel> {
        self.client
            .post(&format!("/v1/channels/{}/hangup", id), &json!({ "cause": cause }))
            .await
    }

    async fn channel_answer(&self, id: &str) -> AppResult<()> {
        self.client
            .post_unit(&format!("/v1/channels/{}/answer", id), &json!({}))
            .await
    }

    async fn channel_dial(&self, id: &str, caller: &str, timeout_secs: u64) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/channels/{}/dial", id),
                &json!({ "caller": caller, "timeout": timeout_secs }),
            )
            .await
    }

    async fn channel_continue(
        &self,
        id: &str,
        context: &str,
        exten: &str,
        priority: i32,
    ) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/channels/{}/continue", id),
                &DialplanTarget { context, exten, priority },
            )
            .await
    }

    async fn channel_redirect(
        &self,
        id: &str,
        context: &str,
        exten: &str,
        priority: i32,
    ) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/channels/{}/redirect", id),
                &DialplanTarget { context, exten, priority },
            )
            .await
    }

    async fn channel_play(
        &self,
        id: &str,
        playback_id: Uuid,
        medias: &[String],
        language: &str,
    ) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/channels/{}/play", id),
                &json!({ "playback_id": playback_id, "medias": medias, "language": language }),
            )
            .await
    }

    async fn channel_playback_stop(&self, id: &str) -> AppResult<()> {
        self.client
            .delete_unit(&format!("/v1/channels/{}/play", id))
            .await
    }

    async fn channel_dtmf_send(
        &self,
        id: &str,
        digits: &str,
        duration_ms: i64,
        interval_ms: i64,
    ) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/channels/{}/dtmf", id),
                &json!({ "digits": digits, "duration": duration_ms, "interval": interval_ms }),
            )
            .await
    }

    async fn channel_snoop(&self, id: &str, snoop_id: &str, app_args: &str) -> AppResult<Channel> {
        self.client
            .post(
                &format!("/v1/channels/{}/snoop", id),
                &json!({ "snoop_id": snoop_id, "app_args": app_args, "spy": "both" }),
            )
            .await
    }

    async fn channel_variable_set(&self, id: &str, key: &str, value: &str) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/channels/{}/variable", id),
                &json!({ "key": key, "value": value }),
            )
            .await
    }

    async fn channel_hold(&self, id: &str, on: bool) -> AppResult<()> {
        self.toggle(id, "hold", on).await
    }

    async fn channel_mute(&self, id: &str, direction: MuteDirection, on: bool) -> AppResult<()> {
        let path = format!("/v1/channels/{}/mute", id);
        let body = json!({ "direction": direction });
        if on {
            self.client.post_unit(&path, &body).await
        } else {
            self.client.delete_with(&path, &body).await
        }
    }

    async fn channel_moh(&self, id: &str, on: bool) -> AppResult<()> {
        self.toggle(id, "moh", on).await
    }

    async fn channel_silence(&self, id: &str, on: bool) -> AppResult<()> {
        self.toggle(id, "silence", on).await
    }
}

#[async_trait]
impl BridgeAdapter for HttpChannelAdapter {
    async fn bridge_create(&self, name: &str) -> AppResult<String> {
        let created: BridgeCreated = self
            .client
            .post("/v1/bridges", &json!({ "name": name, "type": "mixing" }))
            .await?;
        Ok(created.id)
    }

    async fn bridge_delete(&self, bridge_id: &str) -> AppResult<()> {
        self.client
            .delete_unit(&format!("/v1/bridges/{}", bridge_id))
            .await
    }

    async fn bridge_channel_join(&self, bridge_id: &str, channel_id: &str) -> AppResult<()> {
        self.client
            .post_unit(
                &format!("/v1/bridges/{}/channels", bridge_id),
                &json!({ "channel_id": channel_id }),
            )
            .await
    }

    async fn bridge_channel_kick(&self, bridge_id: &str, channel_id: &str) -> AppResult<()> {
        self.client
            .delete_unit(&format!("/v1/bridges/{}/channels/{}", bridge_id, channel_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callctl_core::models::ChannelState;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn adapter(server: &MockServer) -> HttpChannelAdapter {
        HttpChannelAdapter::new(PeerClient::new("channel", &server.uri(), 3000).unwrap())
    }

    #[tokio::test]
    async fn test_hangup_sends_cause_and_returns_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/channels/chan-1/hangup"))
            .and(body_json(json!({ "cause": 17 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chan-1",
                "state": "up",
                "hangup_cause": 17,
                "tm_answer": null,
                "tm_end": "2024-01-01T00:00:00Z",
                "tm_delete": null
            })))
            .mount(&server)
            .await;

        let channel = adapter(&server)
            .await
            .channel_hangup("chan-1", ChannelCause::USER_BUSY)
            .await
            .unwrap();
        assert_eq!(channel.state, ChannelState::Up);
        assert!(channel.is_ended());
    }

    #[tokio::test]
    async fn test_bridge_create_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/bridges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "br-9" })))
            .mount(&server)
            .await;

        let id = adapter(&server)
            .await
            .bridge_create("reference_type=call,reference_id=x")
            .await
            .unwrap();
        assert_eq!(id, "br-9");
    }

    #[tokio::test]
    async fn test_moh_off_is_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/channels/chan-1/moh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        adapter(&server).await.channel_moh("chan-1", false).await.unwrap();
    }
}
