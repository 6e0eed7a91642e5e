//! Collaborator traits
//!
//! The call handler only talks to the outside world through these traits: the
//! call store, the channel/bridge adapter, and the peer services.

use crate::error::AppError;
use crate::models::{
    Action, Activeflow, Address, Call, CallAmd, CallEvent, CallStatus, Channel, ChannelCause,
    Dialroute, Direction, Groupcall, HangupBy, HangupReason, MuteDirection, Provider,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Filters accepted by [`CallRepository::gets`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<CallStatus>,
    /// `Some(false)` excludes deleted calls
    pub deleted: Option<bool>,
}

/// Call record store
#[async_trait]
pub trait CallRepository: Send + Sync {
    async fn create(&self, call: &Call) -> Result<(), AppError>;

    /// Fails with `CallNotFound` when missing
    async fn get(&self, id: Uuid) -> Result<Call, AppError>;

    async fn get_by_channel_id(&self, channel_id: &str) -> Result<Call, AppError>;

    /// Newest first, created strictly before `token`
    async fn gets(
        &self,
        size: u64,
        token: DateTime<Utc>,
        filter: &CallFilter,
    ) -> Result<Vec<Call>, AppError>;

    /// Soft delete
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    /// Move the call to `status` only if its stored status may transition there.
    ///
    /// Also stamps `tm_ringing`/`tm_progressing` for those statuses. `false`
    /// when the stored status does not allow the move.
    async fn set_status(&self, id: Uuid, status: CallStatus) -> Result<bool, AppError>;

    /// Terminal write: status hangup, reason, initiator and `tm_hangup`
    async fn set_hangup(
        &self,
        id: Uuid,
        reason: HangupReason,
        hangup_by: HangupBy,
    ) -> Result<(), AppError>;

    /// Atomically take the advancement hold. `false` when another holder has a live lease.
    async fn acquire_action_next_hold(&self, id: Uuid, lease: Duration) -> Result<bool, AppError>;

    async fn set_action_next_hold(&self, id: Uuid, hold: bool) -> Result<(), AppError>;

    async fn set_action_and_action_next_hold(
        &self,
        id: Uuid,
        action: &Action,
        hold: bool,
    ) -> Result<(), AppError>;

    /// Sets the current recording; a non-nil id is also appended to the history
    async fn set_recording_id(&self, id: Uuid, recording_id: Uuid) -> Result<(), AppError>;

    async fn set_confbridge_id(&self, id: Uuid, confbridge_id: Uuid) -> Result<(), AppError>;

    async fn set_bridge_id(&self, id: Uuid, bridge_id: &str) -> Result<(), AppError>;

    async fn set_data(&self, id: Uuid, data: &HashMap<String, String>) -> Result<(), AppError>;

    async fn set_mute_direction(&self, id: Uuid, direction: MuteDirection)
        -> Result<(), AppError>;

    async fn set_for_route_failover(
        &self,
        id: Uuid,
        channel_id: &str,
        dialroute_id: Uuid,
    ) -> Result<(), AppError>;

    /// Append an external media id while the call holds fewer than `capacity`.
    /// `false` when the call is already full.
    async fn add_external_media_id(
        &self,
        id: Uuid,
        external_media_id: Uuid,
        capacity: usize,
    ) -> Result<bool, AppError>;

    async fn remove_external_media_id(
        &self,
        id: Uuid,
        external_media_id: Uuid,
    ) -> Result<(), AppError>;

    /// Begin a transaction with the call row locked
    async fn call_tx_start(&self, id: Uuid) -> Result<(Box<dyn CallTransaction>, Call), AppError>;
}

/// Compound update scope opened by [`CallRepository::call_tx_start`]
#[async_trait]
pub trait CallTransaction: Send {
    /// Read another call inside the transaction, locking it
    async fn get(&mut self, id: Uuid) -> Result<Call, AppError>;

    async fn add_chained_call_id(&mut self, id: Uuid, chained_call_id: Uuid)
        -> Result<(), AppError>;

    async fn remove_chained_call_id(
        &mut self,
        id: Uuid,
        chained_call_id: Uuid,
    ) -> Result<(), AppError>;

    /// Nil clears the back-reference
    async fn set_master_call_id(&mut self, id: Uuid, master_call_id: Uuid)
        -> Result<(), AppError>;

    /// Commit or roll back
    async fn finish(self: Box<Self>, commit: bool) -> Result<(), AppError>;
}

/// Parameters for creating an outbound channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelCreateRequest {
    pub channel_id: String,
    /// Stasis application arguments
    pub app_args: String,
    /// Dial string, e.g. `pjsip/call-out/sip:+82...@carrier;transport=udp`
    pub endpoint: String,
    #[serde(default)]
    pub other_channel_id: String,
    #[serde(default)]
    pub originator: String,
    #[serde(default)]
    pub formats: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Signaling channel primitives
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    async fn channel_get(&self, id: &str) -> Result<Channel, AppError>;

    async fn channel_create(&self, req: &ChannelCreateRequest) -> Result<Channel, AppError>;

    /// Hang up now; returns the channel as left by the switch
    async fn channel_hangup(&self, id: &str, cause: ChannelCause) -> Result<Channel, AppError>;

    async fn channel_answer(&self, id: &str) -> Result<(), AppError>;

    async fn channel_dial(&self, id: &str, caller: &str, timeout_secs: u64)
        -> Result<(), AppError>;

    /// Resume dialplan execution of a channel in the control application
    async fn channel_continue(
        &self,
        id: &str,
        context: &str,
        exten: &str,
        priority: i32,
    ) -> Result<(), AppError>;

    /// Move a channel that left the control application back into the dialplan
    async fn channel_redirect(
        &self,
        id: &str,
        context: &str,
        exten: &str,
        priority: i32,
    ) -> Result<(), AppError>;

    async fn channel_play(
        &self,
        id: &str,
        playback_id: Uuid,
        medias: &[String],
        language: &str,
    ) -> Result<(), AppError>;

    async fn channel_playback_stop(&self, id: &str) -> Result<(), AppError>;

    async fn channel_dtmf_send(
        &self,
        id: &str,
        digits: &str,
        duration_ms: i64,
        interval_ms: i64,
    ) -> Result<(), AppError>;

    async fn channel_snoop(&self, id: &str, snoop_id: &str, app_args: &str)
        -> Result<Channel, AppError>;

    async fn channel_variable_set(&self, id: &str, key: &str, value: &str)
        -> Result<(), AppError>;

    async fn channel_hold(&self, id: &str, on: bool) -> Result<(), AppError>;

    async fn channel_mute(&self, id: &str, direction: MuteDirection, on: bool)
        -> Result<(), AppError>;

    async fn channel_moh(&self, id: &str, on: bool) -> Result<(), AppError>;

    async fn channel_silence(&self, id: &str, on: bool) -> Result<(), AppError>;
}

/// Mixing bridge primitives
#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    /// Returns the new bridge id
    async fn bridge_create(&self, name: &str) -> Result<String, AppError>;

    async fn bridge_delete(&self, bridge_id: &str) -> Result<(), AppError>;

    async fn bridge_channel_join(&self, bridge_id: &str, channel_id: &str)
        -> Result<(), AppError>;

    async fn bridge_channel_kick(&self, bridge_id: &str, channel_id: &str)
        -> Result<(), AppError>;
}

/// Workflow engine
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn activeflow_create(
        &self,
        id: Uuid,
        customer_id: Uuid,
        flow_id: Uuid,
        reference_id: Uuid,
    ) -> Result<Activeflow, AppError>;

    /// Next action after `current_action_id`
    async fn activeflow_next_action(
        &self,
        activeflow_id: Uuid,
        current_action_id: Uuid,
    ) -> Result<Action, AppError>;

    async fn activeflow_stop(&self, activeflow_id: Uuid) -> Result<(), AppError>;

    /// Values may contain `${name}` references, substituted by the engine
    async fn variables_set(
        &self,
        activeflow_id: Uuid,
        variables: &HashMap<String, String>,
    ) -> Result<(), AppError>;

    async fn variables_get(&self, activeflow_id: Uuid) -> Result<HashMap<String, String>, AppError>;
}

/// Dial route selection
#[async_trait]
pub trait RouteService: Send + Sync {
    async fn dialroutes_get(&self, customer_id: Uuid, target: &str)
        -> Result<Vec<Dialroute>, AppError>;

    async fn provider_get(&self, provider_id: Uuid) -> Result<Provider, AppError>;
}

/// Balance and destination checks
#[async_trait]
pub trait BillingValidator: Send + Sync {
    async fn is_valid_balance(
        &self,
        customer_id: Uuid,
        country: Option<&str>,
    ) -> Result<bool, AppError>;

    async fn is_valid_destination(
        &self,
        customer_id: Uuid,
        source: &Address,
        destination: &Address,
    ) -> Result<bool, AppError>;
}

/// Multi-destination ring coordinator
#[async_trait]
pub trait GroupcallCoordinator: Send + Sync {
    async fn groupcall_start(
        &self,
        customer_id: Uuid,
        flow_id: Uuid,
        master_call_id: Uuid,
        source: &Address,
        destinations: &[Address],
        early_execution: bool,
        connect: bool,
    ) -> Result<Groupcall, AppError>;

    async fn groupcall_answer_call(&self, groupcall_id: Uuid, call_id: Uuid)
        -> Result<(), AppError>;

    async fn groupcall_hangup_call(&self, groupcall_id: Uuid, call_id: Uuid)
        -> Result<(), AppError>;
}

/// Conference bridges
#[async_trait]
pub trait ConfbridgeService: Send + Sync {
    async fn confbridge_join(&self, confbridge_id: Uuid, call_id: Uuid) -> Result<(), AppError>;

    async fn confbridge_kick(&self, confbridge_id: Uuid, call_id: Uuid) -> Result<(), AppError>;

    /// Outbound leg joined to a conference was answered
    async fn confbridge_answer(&self, confbridge_id: Uuid, call_id: Uuid)
        -> Result<(), AppError>;
}

/// Recording parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordingStartRequest {
    pub call_id: Uuid,
    pub channel_id: String,
    pub format: String,
    pub end_of_silence: i64,
    pub end_of_key: String,
    pub duration: i64,
    pub beep_start: bool,
    pub on_end_flow_id: Uuid,
}

/// External media parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalMediaStartRequest {
    pub call_id: Uuid,
    pub channel_id: String,
    pub external_host: String,
    pub encapsulation: String,
    pub transport: String,
    pub connection_type: String,
    pub format: String,
    pub direction: String,
    pub data: String,
}

/// Recording, external media and speech synthesis
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Returns the recording id
    async fn recording_start(&self, req: &RecordingStartRequest) -> Result<Uuid, AppError>;

    async fn recording_stop(&self, recording_id: Uuid) -> Result<(), AppError>;

    /// Returns the external media id
    async fn external_media_start(&self, req: &ExternalMediaStartRequest)
        -> Result<Uuid, AppError>;

    async fn external_media_stop(&self, external_media_id: Uuid) -> Result<(), AppError>;

    /// Returns a playable media URI
    async fn speech_create(
        &self,
        call_id: Uuid,
        text: &str,
        gender: &str,
        language: &str,
    ) -> Result<String, AppError>;
}

/// Webhook event publication
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: CallEvent, call: &Call) -> Result<(), AppError>;
}

/// Delayed requests. Each is delivered back to the RPC surface after `delay_ms`.
#[async_trait]
pub trait RequestScheduler: Send + Sync {
    async fn action_next(&self, call_id: Uuid, force: bool) -> Result<(), AppError>;

    async fn action_timeout(&self, call_id: Uuid, delay_ms: i64, action: &Action)
        -> Result<(), AppError>;

    async fn health_check(&self, call_id: Uuid, delay_ms: i64, retry_count: u32)
        -> Result<(), AppError>;

    async fn channel_hangup(
        &self,
        channel_id: &str,
        cause: ChannelCause,
        delay_ms: i64,
    ) -> Result<(), AppError>;
}

/// Call metrics recorder
pub trait MetricsSink: Send + Sync {
    fn call_created(&self, direction: Direction);

    fn call_hungup(&self, direction: Direction, reason: HangupReason);

    fn action_executed(&self, action: &str, elapsed: std::time::Duration);
}

/// Answering machine detection options keyed by snoop channel id
#[async_trait]
pub trait AmdCache: Send + Sync {
    async fn amd_set(&self, snoop_id: &str, amd: &CallAmd) -> Result<(), AppError>;

    async fn amd_get(&self, snoop_id: &str) -> Result<Option<CallAmd>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_filter_default_is_unfiltered() {
        let f = CallFilter::default();
        assert!(f.customer_id.is_none());
        assert!(f.status.is_none());
        assert!(f.deleted.is_none());
    }

    #[test]
    fn test_channel_create_request_defaults() {
        let req: ChannelCreateRequest = serde_json::from_str(
            r#"{"channel_id":"c1","app_args":"context=call-out","endpoint":"pjsip/call-out/sip:a@b"}"#,
        )
        .unwrap();
        assert!(req.variables.is_empty());
        assert_eq!(req.endpoint, "pjsip/call-out/sip:a@b");
    }
}
