//! Call model
//!
//! The call is the single shared record of the call-control plane. Status moves
//! forward only, along the table in [`CallStatus::can_transition_to`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::action::Action;
use super::address::{Address, AddressType};
use super::channel::{ChannelCause, ChannelState};
use super::dialroute::Dialroute;

/// Call type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CallType {
    #[default]
    #[serde(rename = "")]
    None,
    /// Executes a workflow
    #[serde(rename = "flow")]
    Flow,
    #[serde(rename = "conference")]
    Conference,
    /// Runs a predefined service selected by the destination
    #[serde(rename = "sip-service")]
    SipService,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::None => "",
            CallType::Flow => "flow",
            CallType::Conference => "conference",
            CallType::SipService => "sip-service",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" => Some(CallType::None),
            "flow" => Some(CallType::Flow),
            "conference" => Some(CallType::Conference),
            "sip-service" => Some(CallType::SipService),
            _ => None,
        }
    }
}

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Created, dialing the destination
    #[default]
    Dialing,
    /// Destination confirmed ringing
    Ringing,
    /// Answered, media flowing
    Progressing,
    /// Local side is hanging up
    Terminating,
    /// Originator is cancelling before answer
    Canceling,
    /// Completed
    Hangup,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Dialing => "dialing",
            CallStatus::Ringing => "ringing",
            CallStatus::Progressing => "progressing",
            CallStatus::Terminating => "terminating",
            CallStatus::Canceling => "canceling",
            CallStatus::Hangup => "hangup",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "dialing" => Some(CallStatus::Dialing),
            "ringing" => Some(CallStatus::Ringing),
            "progressing" => Some(CallStatus::Progressing),
            "terminating" => Some(CallStatus::Terminating),
            "canceling" => Some(CallStatus::Canceling),
            "hangup" => Some(CallStatus::Hangup),
            _ => None,
        }
    }

    /// Allowed forward transitions. A status never transitions to itself.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;

        match self {
            Dialing => matches!(next, Ringing | Progressing | Terminating | Canceling | Hangup),
            Ringing => matches!(next, Progressing | Terminating | Canceling | Hangup),
            Progressing => matches!(next, Terminating | Hangup),
            Terminating | Canceling => next == Hangup,
            Hangup => false,
        }
    }

    pub const ALL: [CallStatus; 6] = [
        CallStatus::Dialing,
        CallStatus::Ringing,
        CallStatus::Progressing,
        CallStatus::Terminating,
        CallStatus::Canceling,
        CallStatus::Hangup,
    ];

    /// Statuses allowed to move to `next`
    pub fn predecessors(next: CallStatus) -> Vec<CallStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// Hangup is underway or done
    pub fn is_ending(&self) -> bool {
        matches!(
            self,
            CallStatus::Terminating | CallStatus::Canceling | CallStatus::Hangup
        )
    }

    /// Status implied by a channel state
    pub fn from_channel_state(state: ChannelState) -> Self {
        match state {
            ChannelState::Down
            | ChannelState::Rsrvd
            | ChannelState::OffHook
            | ChannelState::Dialing
            | ChannelState::Busy
            | ChannelState::DialingOffHook
            | ChannelState::PreRing
            | ChannelState::Unknown => CallStatus::Dialing,
            ChannelState::Ring | ChannelState::Ringing => CallStatus::Ringing,
            ChannelState::Up | ChannelState::Mute => CallStatus::Progressing,
        }
    }

    /// Webhook event published when a call enters this status through a status update
    pub fn event(&self) -> Option<CallEvent> {
        match self {
            CallStatus::Dialing => Some(CallEvent::Dialing),
            CallStatus::Ringing => Some(CallEvent::Ringing),
            CallStatus::Progressing => Some(CallEvent::Progressing),
            CallStatus::Terminating => Some(CallEvent::Terminating),
            CallStatus::Canceling => Some(CallEvent::Canceling),
            // published by the hangup path only
            CallStatus::Hangup => None,
        }
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Incoming => "incoming",
            Direction::Outgoing => "outgoing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Direction::Incoming),
            "outgoing" => Some(Direction::Outgoing),
            _ => None,
        }
    }
}

/// Which side ended the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HangupBy {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "remote")]
    Remote,
    #[serde(rename = "local")]
    Local,
}

impl HangupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HangupBy::None => "",
            HangupBy::Remote => "remote",
            HangupBy::Local => "local",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" => Some(HangupBy::None),
            "remote" => Some(HangupBy::Remote),
            "local" => Some(HangupBy::Local),
            _ => None,
        }
    }

    /// Terminating and canceling are entered by us; anything else means the far end left
    pub fn from_status(last_status: CallStatus) -> Self {
        match last_status {
            CallStatus::Terminating | CallStatus::Canceling => HangupBy::Local,
            CallStatus::Dialing
            | CallStatus::Ringing
            | CallStatus::Progressing
            | CallStatus::Hangup => HangupBy::Remote,
        }
    }
}

/// Why the call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HangupReason {
    #[default]
    #[serde(rename = "")]
    None,
    /// Ended after answer
    #[serde(rename = "normal")]
    Normal,
    /// Attempt never reached the network
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "busy")]
    Busy,
    /// Cancelled by the originator before answer
    #[serde(rename = "cancel")]
    Cancel,
    /// Maximum call duration reached
    #[serde(rename = "timeout")]
    Timeout,
    #[serde(rename = "noanswer")]
    Noanswer,
    /// Dialing timed out on our side
    #[serde(rename = "dialout")]
    Dialout,
    /// Answering machine detection ended the call
    #[serde(rename = "amd")]
    Amd,
}

impl fmt::Display for HangupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HangupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HangupReason::None => "",
            HangupReason::Normal => "normal",
            HangupReason::Failed => "failed",
            HangupReason::Busy => "busy",
            HangupReason::Cancel => "cancel",
            HangupReason::Timeout => "timeout",
            HangupReason::Noanswer => "noanswer",
            HangupReason::Dialout => "dialout",
            HangupReason::Amd => "amd",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" => Some(HangupReason::None),
            "normal" => Some(HangupReason::Normal),
            "failed" => Some(HangupReason::Failed),
            "busy" => Some(HangupReason::Busy),
            "cancel" => Some(HangupReason::Cancel),
            "timeout" => Some(HangupReason::Timeout),
            "noanswer" => Some(HangupReason::Noanswer),
            "dialout" => Some(HangupReason::Dialout),
            "amd" => Some(HangupReason::Amd),
            _ => None,
        }
    }

    /// Cause code sent to the switch when we hang up for this reason
    pub fn channel_cause(&self) -> ChannelCause {
        match self {
            HangupReason::None
            | HangupReason::Normal
            | HangupReason::Cancel
            | HangupReason::Timeout => ChannelCause::NORMAL_CLEARING,
            HangupReason::Failed => ChannelCause::NO_USER_RESPONSE,
            HangupReason::Busy => ChannelCause::USER_BUSY,
            HangupReason::Noanswer | HangupReason::Dialout => ChannelCause::NO_ANSWER,
            HangupReason::Amd => ChannelCause::CALL_AMD,
        }
    }

    /// Derive the hangup reason from the direction, the status before hangup and the cause
    pub fn calculate(direction: Direction, last_status: CallStatus, cause: ChannelCause) -> Self {
        match direction {
            Direction::Outgoing => Self::calculate_outgoing(last_status, cause),
            Direction::Incoming => Self::calculate_incoming(last_status, cause),
        }
    }

    fn calculate_incoming(last_status: CallStatus, cause: ChannelCause) -> Self {
        match last_status {
            CallStatus::Dialing | CallStatus::Ringing => match cause {
                ChannelCause::NO_ANSWER => HangupReason::Noanswer,
                ChannelCause::USER_BUSY => HangupReason::Busy,
                _ => HangupReason::Normal,
            },
            CallStatus::Progressing if cause == ChannelCause::CALL_DURATION_TIMEOUT => {
                HangupReason::Timeout
            }
            _ => HangupReason::Normal,
        }
    }

    fn calculate_outgoing(last_status: CallStatus, cause: ChannelCause) -> Self {
        match last_status {
            CallStatus::Dialing | CallStatus::Ringing => match cause {
                ChannelCause::NO_ANSWER | ChannelCause::CALL_REJECTED => HangupReason::Noanswer,
                ChannelCause::USER_BUSY => HangupReason::Busy,
                ChannelCause::NORMAL_CLEARING | ChannelCause::ANSWERED_ELSEWHERE => {
                    HangupReason::Normal
                }
                ChannelCause::UNKNOWN => HangupReason::Dialout,
                _ => HangupReason::Failed,
            },
            CallStatus::Progressing => {
                if cause == ChannelCause::CALL_DURATION_TIMEOUT {
                    HangupReason::Timeout
                } else {
                    HangupReason::Normal
                }
            }
            CallStatus::Terminating => {
                if cause == ChannelCause::CALL_AMD {
                    HangupReason::Amd
                } else {
                    HangupReason::Normal
                }
            }
            CallStatus::Canceling => HangupReason::Cancel,
            CallStatus::Hangup => HangupReason::Normal,
        }
    }
}

/// Mute direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MuteDirection {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "both")]
    Both,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "out")]
    Out,
}

impl MuteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MuteDirection::None => "",
            MuteDirection::Both => "both",
            MuteDirection::In => "in",
            MuteDirection::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "" => Some(MuteDirection::None),
            "both" => Some(MuteDirection::Both),
            "in" => Some(MuteDirection::In),
            "out" => Some(MuteDirection::Out),
            _ => None,
        }
    }
}

/// Keys of the call data flag map
pub mod data_keys {
    /// Start the workflow on ringing instead of on answer
    pub const EARLY_EXECUTION: &str = "early_execution";
    /// Advance the master call's workflow when this call hangs up
    pub const EXECUTE_NEXT_MASTER_ON_HANGUP: &str = "execute_next_master_on_hangup";
}

/// Webhook event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEvent {
    #[serde(rename = "call_created")]
    Created,
    #[serde(rename = "call_updated")]
    Updated,
    #[serde(rename = "call_dialing")]
    Dialing,
    #[serde(rename = "call_ringing")]
    Ringing,
    #[serde(rename = "call_progressing")]
    Progressing,
    #[serde(rename = "call_terminating")]
    Terminating,
    #[serde(rename = "call_canceling")]
    Canceling,
    #[serde(rename = "call_hangup")]
    Hangup,
    #[serde(rename = "call_deleted")]
    Deleted,
}

impl CallEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallEvent::Created => "call_created",
            CallEvent::Updated => "call_updated",
            CallEvent::Dialing => "call_dialing",
            CallEvent::Ringing => "call_ringing",
            CallEvent::Progressing => "call_progressing",
            CallEvent::Terminating => "call_terminating",
            CallEvent::Canceling => "call_canceling",
            CallEvent::Hangup => "call_hangup",
            CallEvent::Deleted => "call_deleted",
        }
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Call {
    pub id: Uuid,
    pub customer_id: Uuid,

    /// Owner of the address the call belongs to
    #[serde(default)]
    pub owner_type: String,
    #[serde(default)]
    pub owner_id: Uuid,

    pub channel_id: String,
    /// Call bridge the channel sits in
    #[serde(default)]
    pub bridge_id: String,

    pub flow_id: Uuid,
    pub activeflow_id: Uuid,
    /// Conference bridge currently joined
    #[serde(default)]
    pub confbridge_id: Uuid,

    #[serde(rename = "type", default)]
    pub kind: CallType,

    #[serde(default)]
    pub master_call_id: Uuid,
    #[serde(default)]
    pub chained_call_ids: Vec<Uuid>,

    /// Current recording
    #[serde(default)]
    pub recording_id: Uuid,
    /// Every recording made on this call
    #[serde(default)]
    pub recording_ids: Vec<Uuid>,

    /// Running external media sessions, bounded
    #[serde(default)]
    pub external_media_ids: Vec<Uuid>,

    #[serde(default)]
    pub groupcall_id: Uuid,

    pub source: Address,
    pub destination: Address,

    pub status: CallStatus,

    /// Flag map, see [`data_keys`]
    #[serde(default)]
    pub data: HashMap<String, String>,

    /// Action currently executing
    #[serde(default)]
    pub action: Action,

    /// Advancement latch. Set while one advancement is in flight.
    #[serde(default)]
    pub action_next_hold: bool,
    #[serde(default)]
    pub tm_action_next_hold: Option<DateTime<Utc>>,

    pub direction: Direction,
    #[serde(default)]
    pub mute_direction: MuteDirection,

    #[serde(default)]
    pub hangup_by: HangupBy,
    #[serde(default)]
    pub hangup_reason: HangupReason,

    /// Dial route in use
    #[serde(default)]
    pub dialroute_id: Uuid,
    /// Candidate dial routes, tried in order
    #[serde(default)]
    pub dialroutes: Vec<Dialroute>,

    pub tm_ringing: Option<DateTime<Utc>>,
    pub tm_progressing: Option<DateTime<Utc>>,
    pub tm_hangup: Option<DateTime<Utc>>,

    pub tm_create: Option<DateTime<Utc>>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Call {
    fn flag(&self, key: &str) -> bool {
        self.data.get(key).map(|v| v == "true").unwrap_or(false)
    }

    pub fn is_early_execution(&self) -> bool {
        self.flag(data_keys::EARLY_EXECUTION)
    }

    pub fn is_execute_next_master_on_hangup(&self) -> bool {
        self.flag(data_keys::EXECUTE_NEXT_MASTER_ON_HANGUP)
    }

    pub fn has_activeflow(&self) -> bool {
        !self.activeflow_id.is_nil()
    }

    pub fn has_master(&self) -> bool {
        !self.master_call_id.is_nil()
    }

    /// Hold is set and its lease has not expired
    pub fn is_action_next_held(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        if !self.action_next_hold {
            return false;
        }

        match self.tm_action_next_hold {
            Some(acquired) => now - acquired < lease,
            // hold written without a timestamp never expires
            None => true,
        }
    }

    /// Hung up, or deleted
    pub fn is_finished(&self) -> bool {
        self.status == CallStatus::Hangup || self.tm_hangup.is_some() || self.tm_delete.is_some()
    }

    /// The dial route after the current one
    pub fn next_dialroute(&self) -> Option<&Dialroute> {
        let idx = self
            .dialroutes
            .iter()
            .position(|r| r.id == self.dialroute_id)
            .unwrap_or(self.dialroutes.len());

        self.dialroutes.get(idx + 1)
    }

    pub fn is_outgoing_tel(&self) -> bool {
        self.direction == Direction::Outgoing && self.destination.kind == AddressType::Tel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use CallStatus::*;

    #[test]
    fn test_transition_table() {
        assert!(Dialing.can_transition_to(Ringing));
        assert!(Dialing.can_transition_to(Canceling));
        assert!(Ringing.can_transition_to(Progressing));
        assert!(!Ringing.can_transition_to(Dialing));
        assert!(!Progressing.can_transition_to(Canceling));
        assert!(Progressing.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Hangup));
        assert!(!Terminating.can_transition_to(Canceling));
        assert!(Canceling.can_transition_to(Hangup));
    }

    #[test]
    fn test_no_self_transition_and_hangup_is_terminal() {
        for s in CallStatus::ALL {
            assert!(!s.can_transition_to(s), "{} -> {}", s, s);
            assert!(!Hangup.can_transition_to(s));
        }
    }

    #[test]
    fn test_predecessors() {
        assert_eq!(CallStatus::predecessors(Dialing), vec![]);
        assert_eq!(CallStatus::predecessors(Progressing), vec![Dialing, Ringing]);
        assert_eq!(
            CallStatus::predecessors(Hangup),
            vec![Dialing, Ringing, Progressing, Terminating, Canceling]
        );
        assert!(!CallStatus::predecessors(Terminating).contains(&Hangup));
    }

    #[test]
    fn test_status_from_channel_state() {
        assert_eq!(CallStatus::from_channel_state(ChannelState::Down), Dialing);
        assert_eq!(CallStatus::from_channel_state(ChannelState::PreRing), Dialing);
        assert_eq!(CallStatus::from_channel_state(ChannelState::Ring), Ringing);
        assert_eq!(CallStatus::from_channel_state(ChannelState::Ringing), Ringing);
        assert_eq!(CallStatus::from_channel_state(ChannelState::Up), Progressing);
        assert_eq!(CallStatus::from_channel_state(ChannelState::Mute), Progressing);
    }

    #[test]
    fn test_hangup_reason_outgoing() {
        let out = Direction::Outgoing;
        assert_eq!(HangupReason::calculate(out, Ringing, ChannelCause::USER_BUSY), HangupReason::Busy);
        assert_eq!(HangupReason::calculate(out, Dialing, ChannelCause::CALL_REJECTED), HangupReason::Noanswer);
        assert_eq!(HangupReason::calculate(out, Dialing, ChannelCause::ANSWERED_ELSEWHERE), HangupReason::Normal);
        assert_eq!(HangupReason::calculate(out, Dialing, ChannelCause::UNKNOWN), HangupReason::Dialout);
        assert_eq!(HangupReason::calculate(out, Dialing, ChannelCause::NETWORK_OUT_OF_ORDER), HangupReason::Failed);
        assert_eq!(HangupReason::calculate(out, Progressing, ChannelCause::CALL_DURATION_TIMEOUT), HangupReason::Timeout);
        assert_eq!(HangupReason::calculate(out, Progressing, ChannelCause::USER_BUSY), HangupReason::Normal);
        assert_eq!(HangupReason::calculate(out, Terminating, ChannelCause::CALL_AMD), HangupReason::Amd);
        assert_eq!(HangupReason::calculate(out, Canceling, ChannelCause::NORMAL_CLEARING), HangupReason::Cancel);
        assert_eq!(HangupReason::calculate(out, Hangup, ChannelCause::USER_BUSY), HangupReason::Normal);
    }

    #[test]
    fn test_hangup_reason_incoming() {
        let inc = Direction::Incoming;
        assert_eq!(HangupReason::calculate(inc, Ringing, ChannelCause::NO_ANSWER), HangupReason::Noanswer);
        assert_eq!(HangupReason::calculate(inc, Dialing, ChannelCause::USER_BUSY), HangupReason::Busy);
        assert_eq!(HangupReason::calculate(inc, Dialing, ChannelCause::CALL_REJECTED), HangupReason::Normal);
        assert_eq!(HangupReason::calculate(inc, Progressing, ChannelCause::CALL_DURATION_TIMEOUT), HangupReason::Timeout);
        assert_eq!(HangupReason::calculate(inc, Canceling, ChannelCause::CALL_AMD), HangupReason::Normal);
    }

    #[test]
    fn test_hangup_by() {
        assert_eq!(HangupBy::from_status(Ringing), HangupBy::Remote);
        assert_eq!(HangupBy::from_status(Hangup), HangupBy::Remote);
        assert_eq!(HangupBy::from_status(Terminating), HangupBy::Local);
        assert_eq!(HangupBy::from_status(Canceling), HangupBy::Local);
    }

    #[test]
    fn test_reason_to_cause() {
        assert_eq!(HangupReason::Normal.channel_cause(), ChannelCause::NORMAL_CLEARING);
        assert_eq!(HangupReason::Timeout.channel_cause(), ChannelCause::NORMAL_CLEARING);
        assert_eq!(HangupReason::Failed.channel_cause(), ChannelCause::NO_USER_RESPONSE);
        assert_eq!(HangupReason::Busy.channel_cause(), ChannelCause::USER_BUSY);
        assert_eq!(HangupReason::Dialout.channel_cause(), ChannelCause::NO_ANSWER);
        assert_eq!(HangupReason::Amd.channel_cause(), ChannelCause::CALL_AMD);
    }

    #[test]
    fn test_hold_lease() {
        let now = Utc::now();
        let lease = Duration::seconds(30);
        let mut c = Call::default();
        assert!(!c.is_action_next_held(now, lease));

        c.action_next_hold = true;
        c.tm_action_next_hold = Some(now - Duration::seconds(5));
        assert!(c.is_action_next_held(now, lease));

        c.tm_action_next_hold = Some(now - Duration::seconds(31));
        assert!(!c.is_action_next_held(now, lease));
    }

    #[test]
    fn test_next_dialroute() {
        let routes: Vec<Dialroute> = (0..3)
            .map(|i| Dialroute {
                id: Uuid::from_u128(100 + i),
                ..Default::default()
            })
            .collect();

        let mut c = Call {
            dialroutes: routes.clone(),
            dialroute_id: routes[0].id,
            ..Default::default()
        };
        assert_eq!(c.next_dialroute().map(|r| r.id), Some(routes[1].id));

        c.dialroute_id = routes[2].id;
        assert!(c.next_dialroute().is_none());

        c.dialroute_id = Uuid::new_v4();
        assert!(c.next_dialroute().is_none());
    }

    #[test]
    fn test_data_flags() {
        let mut c = Call::default();
        assert!(!c.is_early_execution());
        c.data.insert(data_keys::EARLY_EXECUTION.into(), "true".into());
        c.data.insert(data_keys::EXECUTE_NEXT_MASTER_ON_HANGUP.into(), "false".into());
        assert!(c.is_early_execution());
        assert!(!c.is_execute_next_master_on_hangup());
    }

    #[test]
    fn test_call_event_names() {
        assert_eq!(serde_json::to_string(&CallEvent::Hangup).unwrap(), "\"call_hangup\"");
        assert_eq!(Ringing.event(), Some(CallEvent::Ringing));
        assert_eq!(Hangup.event(), None);
    }
}
