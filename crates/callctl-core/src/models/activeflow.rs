//! Workflow engine types
//!
//! An activeflow is a running workflow instance bound to one call. The engine
//! owns it; the call only keeps its id and the action currently executing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::action::Action;

/// Running workflow instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Activeflow {
    pub id: Uuid,
    #[serde(default)]
    pub customer_id: Uuid,
    pub flow_id: Uuid,
    /// `call` for call-bound flows
    #[serde(default)]
    pub reference_type: String,
    #[serde(default)]
    pub reference_id: Uuid,
    #[serde(default)]
    pub current_action: Action,
}

impl Activeflow {
    pub const REFERENCE_TYPE_CALL: &'static str = "call";
}

/// Workflow variable names written for every call
pub mod variables {
    pub const CALL_ID: &str = "callctl.call.id";
    pub const SOURCE_TYPE: &str = "callctl.call.source.type";
    pub const SOURCE_TARGET: &str = "callctl.call.source.target";
    pub const SOURCE_TARGET_NAME: &str = "callctl.call.source.target_name";
    pub const DESTINATION_TYPE: &str = "callctl.call.destination.type";
    pub const DESTINATION_TARGET: &str = "callctl.call.destination.target";
    pub const DESTINATION_TARGET_NAME: &str = "callctl.call.destination.target_name";
    pub const DIRECTION: &str = "callctl.call.direction";
    /// Digits collected so far
    pub const DIGITS: &str = "callctl.call.digits";

    /// Substitution template appending `digit` to the collected digits
    pub fn digits_append_template(digit: &str) -> String {
        format!("${{{}}}{}", DIGITS, digit)
    }
}
