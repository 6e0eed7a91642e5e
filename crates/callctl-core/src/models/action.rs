//! Workflow actions executed against a call
//!
//! Actions come from the workflow engine. The call keeps a copy of the one it is
//! currently executing, stamped with the time it started executing.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppResult;

/// Sentinel id: no action could be fetched
pub const ACTION_ID_EMPTY: Uuid = Uuid::nil();

/// Sentinel id: the workflow has no more actions
pub const ACTION_ID_FINISH: Uuid = Uuid::from_u128(1);

/// Action type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Amd,
    Answer,
    Beep,
    ConfbridgeJoin,
    DigitsReceive,
    DigitsSend,
    Echo,
    ExternalMediaStart,
    ExternalMediaStop,
    Hangup,
    Play,
    RecordingStart,
    RecordingStop,
    Sleep,
    StreamEcho,
    Talk,
    /// Any tag this service does not execute
    #[default]
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Amd => "amd",
            ActionType::Answer => "answer",
            ActionType::Beep => "beep",
            ActionType::ConfbridgeJoin => "confbridge_join",
            ActionType::DigitsReceive => "digits_receive",
            ActionType::DigitsSend => "digits_send",
            ActionType::Echo => "echo",
            ActionType::ExternalMediaStart => "external_media_start",
            ActionType::ExternalMediaStop => "external_media_stop",
            ActionType::Hangup => "hangup",
            ActionType::Play => "play",
            ActionType::RecordingStart => "recording_start",
            ActionType::RecordingStop => "recording_stop",
            ActionType::Sleep => "sleep",
            ActionType::StreamEcho => "stream_echo",
            ActionType::Talk => "talk",
            ActionType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single workflow instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Action {
    pub id: Uuid,

    #[serde(default)]
    pub next_id: Uuid,

    #[serde(rename = "type", default)]
    pub kind: ActionType,

    /// Type specific payload, parsed on execution
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub option: serde_json::Value,

    /// When this action started executing on the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tm_execute: Option<DateTime<Utc>>,
}

impl Action {
    pub fn new(id: Uuid, kind: ActionType, option: serde_json::Value) -> Self {
        Self {
            id,
            next_id: Uuid::nil(),
            kind,
            option,
            tm_execute: None,
        }
    }

    /// Placeholder carried by calls whose workflow could not be started
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the workflow has nothing more to run for this call
    pub fn is_terminal_sentinel(&self) -> bool {
        self.id == ACTION_ID_EMPTY || self.id == ACTION_ID_FINISH
    }

    /// Deserialize the option payload; a missing payload parses as `{}`
    pub fn parse_option<T: DeserializeOwned>(&self) -> AppResult<T> {
        let value = if self.option.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            self.option.clone()
        };

        serde_json::from_value(value).map_err(|e| {
            AppError::InvalidActionOption(format!("{} option: {}", self.kind, e))
        })
    }

    /// Same action instance: identical id and execution stamp
    pub fn is_same_execution(&self, other: &Action) -> bool {
        self.id == other.id && self.tm_execute == other.tm_execute
    }
}

/// Answering machine detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionAmd {
    /// `hangup` or `continue`
    #[serde(default)]
    pub machine_handle: String,

    /// Continue the workflow while detection runs
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionConfbridgeJoin {
    pub confbridge_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionDigitsReceive {
    /// Wait time in milliseconds
    #[serde(default)]
    pub duration: i64,

    /// Number of digits that completes collection
    #[serde(default)]
    pub length: i64,

    /// Terminator keys, any of which completes collection
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionDigitsSend {
    pub digits: String,

    /// Tone length in milliseconds
    #[serde(default)]
    pub duration: i64,

    /// Gap between tones in milliseconds
    #[serde(default)]
    pub interval: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionEcho {
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionExternalMediaStart {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionHangup {
    #[serde(default)]
    pub reason: String,

    /// Mirror this call's hangup cause
    #[serde(default)]
    pub reference_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionPlay {
    #[serde(default)]
    pub stream_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionRecordingStart {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub end_of_silence: i64,
    #[serde(default)]
    pub end_of_key: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub beep_start: bool,
    #[serde(default)]
    pub on_end_flow_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionSleep {
    #[serde(default)]
    pub duration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OptionTalk {
    pub text: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub language: String,

    /// `next` skips the rest of the talk when a digit is pressed
    #[serde(default)]
    pub digits_handle: String,
}

/// `digits_handle` value that advances on any digit
pub const DIGITS_HANDLE_NEXT: &str = "next";
