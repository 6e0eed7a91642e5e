//! Signaling channel representation
//!
//! Channels are owned by the channel adapter; this service only reads them
//! and reacts to their events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Channel state as reported by the switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Down,
    Rsrvd,
    #[serde(rename = "offhook")]
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
    #[serde(rename = "dialing_offhook")]
    DialingOffHook,
    #[serde(rename = "prering")]
    PreRing,
    Mute,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Hangup cause code
///
/// Q.850 values where one exists, plus platform codes above 899.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ChannelCause(pub i32);

impl ChannelCause {
    pub const UNKNOWN: ChannelCause = ChannelCause(0);
    pub const NO_ROUTE_DESTINATION: ChannelCause = ChannelCause(3);
    pub const NORMAL_CLEARING: ChannelCause = ChannelCause(16);
    pub const USER_BUSY: ChannelCause = ChannelCause(17);
    pub const NO_USER_RESPONSE: ChannelCause = ChannelCause(18);
    pub const NO_ANSWER: ChannelCause = ChannelCause(19);
    pub const CALL_REJECTED: ChannelCause = ChannelCause(21);
    pub const ANSWERED_ELSEWHERE: ChannelCause = ChannelCause(26);
    pub const NETWORK_OUT_OF_ORDER: ChannelCause = ChannelCause(38);
    /// Call reached its maximum duration
    pub const CALL_DURATION_TIMEOUT: ChannelCause = ChannelCause(900);
    /// Answering machine detected
    pub const CALL_AMD: ChannelCause = ChannelCause(901);

    /// Causes after which another dial route must not be tried
    pub const NON_RETRYABLE: [ChannelCause; 7] = [
        ChannelCause::NORMAL_CLEARING,
        ChannelCause::USER_BUSY,
        ChannelCause::NO_ANSWER,
        ChannelCause::CALL_REJECTED,
        ChannelCause::ANSWERED_ELSEWHERE,
        ChannelCause::CALL_DURATION_TIMEOUT,
        ChannelCause::CALL_AMD,
    ];

    pub fn is_retryable(&self) -> bool {
        !Self::NON_RETRYABLE.contains(self)
    }
}

impl fmt::Display for ChannelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SIP transport of an outbound dial target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SipTransport {
    Udp,
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl SipTransport {
    /// Detect the transport from the `transport=` parameter of a dial URI
    pub fn detect(dial_uri: &str) -> Self {
        if dial_uri.contains("transport=wss") {
            SipTransport::Wss
        } else if dial_uri.contains("transport=ws") {
            SipTransport::Ws
        } else if dial_uri.contains("transport=tcp") {
            SipTransport::Tcp
        } else if dial_uri.contains("transport=tls") {
            SipTransport::Tls
        } else {
            SipTransport::Udp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SipTransport::Udp => "udp",
            SipTransport::Tcp => "tcp",
            SipTransport::Tls => "tls",
            SipTransport::Ws => "ws",
            SipTransport::Wss => "wss",
        }
    }

    /// SDP media transport profile announced for this transport
    pub fn sdp_transport(&self) -> &'static str {
        match self {
            SipTransport::Ws | SipTransport::Wss => "UDP/TLS/RTP/SAVPF",
            _ => "RTP/AVP",
        }
    }
}

/// Stasis data keys
pub mod stasis {
    pub const CONTEXT_TYPE: &str = "context_type";
    pub const CONTEXT: &str = "context";
    pub const CALL_ID: &str = "call_id";
    pub const TRANSPORT: &str = "transport";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const FLOW_ID: &str = "flow_id";
    pub const SOURCE: &str = "source";
    pub const DESTINATION: &str = "destination";

    pub const CONTEXT_TYPE_CALL: &str = "call";
    pub const CONTEXT_CALL_INCOMING: &str = "call-in";
    pub const CONTEXT_CALL_OUTGOING: &str = "call-out";
}

/// Parse stasis application arguments
///
/// Arguments are a comma separated list of `key=value` pairs:
/// ```text
/// context_type=call,context=call-out,call_id=3f1c...,transport=udp
/// ```
/// Values are URL-decoded; pairs without `=` are ignored.
pub fn parse_stasis_data(raw: &str) -> HashMap<String, String> {
    let mut data = HashMap::new();

    for pair in raw.split(',') {
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }

            let value = value.trim();
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());

            data.insert(key.to_string(), decoded);
        }
    }

    data
}

/// Build stasis application arguments from ordered pairs
pub fn format_stasis_data(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Signaling channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Channel {
    pub id: String,

    /// Switch instance owning the channel
    #[serde(default)]
    pub asterisk_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub state: ChannelState,

    /// Control application the channel is attached to; empty when detached
    #[serde(default)]
    pub stasis_name: String,

    #[serde(default)]
    pub stasis_data: HashMap<String, String>,

    #[serde(default)]
    pub bridge_id: String,

    /// Running playback, if any
    #[serde(default)]
    pub playback_id: String,

    #[serde(default)]
    pub hangup_cause: ChannelCause,

    pub tm_answer: Option<DateTime<Utc>>,
    pub tm_end: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Channel {
    /// Channel has ended or been removed
    pub fn is_ended(&self) -> bool {
        self.tm_end.is_some() || self.tm_delete.is_some()
    }

    pub fn stasis(&self, key: &str) -> Option<&str> {
        self.stasis_data.get(key).map(|s| s.as_str())
    }
}
