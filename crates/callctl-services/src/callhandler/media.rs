//! Media controls on a live call
//!
//! Recording, external media sessions and the per-channel switches (hold,
//! mute, music on hold, silence). Everything here refuses hung up calls.

use callctl_core::{
    models::{Call, CallStatus, MuteDirection},
    traits::{ExternalMediaStartRequest, RecordingStartRequest},
    AppError, AppResult,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::CallHandler;

impl CallHandler {
    async fn get_live(&self, id: Uuid) -> AppResult<Call> {
        let call = self.calls.get(id).await?;
        if call.status == CallStatus::Hangup {
            return Err(AppError::InvalidStatus(format!(
                "call {} is already hung up",
                call.id
            )));
        }
        Ok(call)
    }

    /// Start recording the call. Only answered calls can be recorded.
    #[instrument(skip(self, req))]
    pub async fn recording_start(&self, id: Uuid, req: &RecordingStartRequest) -> AppResult<Call> {
        let call = self.calls.get(id).await?;
        if call.status != CallStatus::Progressing {
            return Err(AppError::InvalidStatus(format!(
                "call {} is not progressing, status: {}",
                call.id, call.status
            )));
        }

        let req = RecordingStartRequest {
            call_id: call.id,
            channel_id: call.channel_id.clone(),
            ..req.clone()
        };
        let recording_id = self.media.recording_start(&req).await?;
        info!("Started the recording {}.", recording_id);

        self.update_recording_id(call.id, recording_id).await
    }

    #[instrument(skip(self))]
    pub async fn recording_stop(&self, id: Uuid) -> AppResult<Call> {
        let call = self.get_live(id).await?;
        if call.recording_id.is_nil() {
            return Err(AppError::NotFound(format!("recording of call {}", call.id)));
        }

        self.media.recording_stop(call.recording_id).await?;
        self.update_recording_id(call.id, Uuid::nil()).await
    }

    /// Start an external media session, bounded per call
    #[instrument(skip(self, req))]
    pub async fn external_media_start(
        &self,
        id: Uuid,
        req: &ExternalMediaStartRequest,
    ) -> AppResult<Call> {
        let call = self.get_live(id).await?;

        let max = self.settings.external_media_capacity;
        if call.external_media_ids.len() >= max {
            return Err(AppError::ExternalMediaCapacity { max });
        }

        let req = ExternalMediaStartRequest {
            call_id: call.id,
            channel_id: call.channel_id.clone(),
            ..req.clone()
        };
        let external_media_id = self.media.external_media_start(&req).await?;

        let err = match self
            .calls
            .add_external_media_id(call.id, external_media_id, max)
            .await
        {
            Ok(true) => None,
            Ok(false) => Some(AppError::ExternalMediaCapacity { max }),
            Err(e) => Some(e),
        };
        if let Some(e) = err {
            warn!("Could not register the external media. Stopping it. err: {}", e);
            if let Err(e) = self.media.external_media_stop(external_media_id).await {
                warn!("Could not stop the external media {}. err: {}", external_media_id, e);
            }
            return Err(e);
        }

        self.fetch_and_publish_updated(call.id).await
    }

    #[instrument(skip(self))]
    pub async fn external_media_stop(&self, id: Uuid, external_media_id: Uuid) -> AppResult<Call> {
        let call = self.calls.get(id).await?;
        if !call.external_media_ids.contains(&external_media_id) {
            return Err(AppError::NotFound(format!(
                "external media {} of call {}",
                external_media_id, call.id
            )));
        }

        self.calls
            .remove_external_media_id(call.id, external_media_id)
            .await?;
        self.media.external_media_stop(external_media_id).await?;

        self.fetch_and_publish_updated(call.id).await
    }

    /// Speak `text` on the call
    pub async fn talk(&self, id: Uuid, text: &str, gender: &str, language: &str) -> AppResult<()> {
        let call = self.get_live(id).await?;
        let media_uri = self
            .media
            .speech_create(call.id, text, gender, language)
            .await?;

        self.channels
            .channel_play(&call.channel_id, Uuid::new_v4(), &[media_uri], language)
            .await
    }

    pub async fn play(&self, id: Uuid, media_urls: &[String]) -> AppResult<()> {
        let call = self.get_live(id).await?;
        self.channels
            .channel_play(&call.channel_id, Uuid::new_v4(), media_urls, "")
            .await
    }

    /// Stop whatever is playing on the call
    pub async fn media_stop(&self, id: Uuid) -> AppResult<()> {
        let call = self.get_live(id).await?;
        self.channels.channel_playback_stop(&call.channel_id).await
    }

    pub async fn hold(&self, id: Uuid, on: bool) -> AppResult<()> {
        let call = self.get_live(id).await?;
        self.channels.channel_hold(&call.channel_id, on).await
    }

    /// Mute one or both directions. The stored direction reflects the last request.
    #[instrument(skip(self))]
    pub async fn mute(&self, id: Uuid, direction: MuteDirection, on: bool) -> AppResult<Call> {
        let call = self.get_live(id).await?;
        self.channels
            .channel_mute(&call.channel_id, direction, on)
            .await?;

        let stored = if on { direction } else { MuteDirection::None };
        self.update_mute_direction(call.id, stored).await
    }

    pub async fn moh(&self, id: Uuid, on: bool) -> AppResult<()> {
        let call = self.get_live(id).await?;
        self.channels.channel_moh(&call.channel_id, on).await
    }

    pub async fn silence(&self, id: Uuid, on: bool) -> AppResult<()> {
        let call = self.get_live(id).await?;
        self.channels.channel_silence(&call.channel_id, on).await
    }
}
