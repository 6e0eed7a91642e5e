//! Domain models for callctl
//!
//! This module contains all the core domain models used throughout the application.

pub mod action;
pub mod activeflow;
pub mod address;
pub mod call;
pub mod channel;
pub mod dialroute;
pub mod groupcall;

pub use action::{Action, ActionType, ACTION_ID_EMPTY, ACTION_ID_FINISH};
pub use activeflow::Activeflow;
pub use address::{Address, AddressType};
pub use call::{
    Call, CallEvent, CallStatus, CallType, Direction, HangupBy, HangupReason, MuteDirection,
};
pub use channel::{Channel, ChannelCause, ChannelState, SipTransport};
pub use dialroute::{Dialroute, Provider};
pub use groupcall::{CallAmd, Groupcall};
