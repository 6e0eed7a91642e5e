//! Call DTOs

use callctl_core::{
    models::{Action, Address, Call, Groupcall, MuteDirection},
    traits::{ExternalMediaStartRequest, RecordingStartRequest},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Request to dial one or more destinations
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallCreateRequest {
    pub customer_id: Uuid,

    pub flow_id: Uuid,

    /// Call that the created calls are chained under
    #[serde(default)]
    pub master_call_id: Uuid,

    pub source: Address,

    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 destinations"))]
    pub destinations: Vec<Address>,

    /// Run the flow before the destination answers
    #[serde(default)]
    pub early_execution: bool,

    /// Hang up the master call when the created calls hang up
    #[serde(default)]
    pub connect: bool,
}

/// Calls and groupcalls created by a [`CallCreateRequest`]
#[derive(Debug, Clone, Serialize)]
pub struct CallCreateResponse {
    pub calls: Vec<Call>,
    pub groupcalls: Vec<Groupcall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionNextRequest {
    /// Advance even when another advancement holds the call
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionTimeoutRequest {
    /// The action instance the timer was armed for
    pub action: Action,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthCheckRequest {
    #[serde(default)]
    pub retry_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DigitsRequest {
    #[validate(length(max = 256))]
    pub digits: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainedCallIdRequest {
    pub chained_call_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfbridgeIdRequest {
    /// Nil clears the conference
    pub confbridge_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordingIdRequest {
    /// Nil clears the active recording
    pub recording_id: Uuid,
}

/// Recording parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallRecordingStartRequest {
    #[serde(default = "default_recording_format")]
    #[validate(length(min = 1, max = 16))]
    pub format: String,

    /// Seconds of silence that end the recording, 0 disables
    #[serde(default)]
    #[validate(range(min = 0))]
    pub end_of_silence: i64,

    /// Keys that end the recording
    #[serde(default)]
    pub end_of_key: String,

    /// Maximum length in seconds, 0 is unlimited
    #[serde(default)]
    #[validate(range(min = 0))]
    pub duration: i64,

    #[serde(default)]
    pub beep_start: bool,

    #[serde(default)]
    pub on_end_flow_id: Uuid,
}

fn default_recording_format() -> String {
    "wav".to_string()
}

impl From<CallRecordingStartRequest> for RecordingStartRequest {
    fn from(req: CallRecordingStartRequest) -> Self {
        Self {
            format: req.format,
            end_of_silence: req.end_of_silence,
            end_of_key: req.end_of_key,
            duration: req.duration,
            beep_start: req.beep_start,
            on_end_flow_id: req.on_end_flow_id,
            ..Default::default()
        }
    }
}

/// External media parameters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallExternalMediaRequest {
    /// `host:port` receiving the media
    #[validate(length(min = 1, max = 255))]
    pub external_host: String,

    #[serde(default)]
    pub encapsulation: String,

    #[serde(default)]
    pub transport: String,

    #[serde(default)]
    pub connection_type: String,

    #[serde(default)]
    pub format: String,

    #[serde(default)]
    pub direction: String,

    #[serde(default)]
    pub data: String,
}

impl From<CallExternalMediaRequest> for ExternalMediaStartRequest {
    fn from(req: CallExternalMediaRequest) -> Self {
        Self {
            external_host: req.external_host,
            encapsulation: req.encapsulation,
            transport: req.transport,
            connection_type: req.connection_type,
            format: req.format,
            direction: req.direction,
            data: req.data,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TalkRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,

    #[serde(default)]
    pub gender: String,

    #[serde(default)]
    pub language: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlayRequest {
    #[validate(length(min = 1))]
    pub media_urls: Vec<String>,
}

/// Direction of a mute switch, both when omitted
#[derive(Debug, Clone, Deserialize)]
pub struct MuteRequest {
    #[serde(default = "default_mute_direction")]
    pub direction: MuteDirection,
}

fn default_mute_direction() -> MuteDirection {
    MuteDirection::Both
}
