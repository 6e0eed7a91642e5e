//! Recording, external media and speech synthesis client

use async_trait::async_trait;
use callctl_core::{
    traits::{ExternalMediaStartRequest, MediaService, RecordingStartRequest},
    AppResult,
};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use crate::client::PeerClient;

#[derive(Debug, Deserialize)]
struct Created {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct Speech {
    media_uri: String,
}

/// HTTP client of the media services
pub struct HttpMediaService {
    client: PeerClient,
}

impl HttpMediaService {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaService for HttpMediaService {
    #[instrument(skip(self, req), fields(call_id = %req.call_id))]
    async fn recording_start(&self, req: &RecordingStartRequest) -> AppResult<Uuid> {
        let created: Created = self.client.post("/v1/recordings", req).await?;
        Ok(created.id)
    }

    async fn recording_stop(&self, recording_id: Uuid) -> AppResult<()> {
        self.client
            .post_unit(&format!("/v1/recordings/{}/stop", recording_id), &json!({}))
            .await
    }

    #[instrument(skip(self, req), fields(call_id = %req.call_id))]
    async fn external_media_start(&self, req: &ExternalMediaStartRequest) -> AppResult<Uuid> {
        let created: Created = self.client.post("/v1/external-medias", req).await?;
        Ok(created.id)
    }

    async fn external_media_stop(&self, external_media_id: Uuid) -> AppResult<()> {
        self.client
            .delete_unit(&format!("/v1/external-medias/{}", external_media_id))
            .await
    }

    async fn speech_create(
        &self,
        call_id: Uuid,
        text: &str,
        gender: &str,
        language: &str,
    ) -> AppResult<String> {
        let speech: Speech = self
            .client
            .post(
                "/v1/speeches",
                &json!({
                    "call_id": call_id,
                    "text": text,
                    "gender": gender,
                    "language": language,
                }),
            )
            .await?;
        Ok(speech.media_uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_speech_create_returns_uri() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/speeches"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "media_uri": "http://tts/1.wav" })),
            )
            .mount(&server)
            .await;

        let svc = HttpMediaService::new(PeerClient::new("media", &server.uri(), 3000).unwrap());
        let uri = svc
            .speech_create(Uuid::new_v4(), "hello", "female", "en-US")
            .await
            .unwrap();
        assert_eq!(uri, "http://tts/1.wav");
    }
}
