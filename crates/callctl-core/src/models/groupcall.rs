//! Multi-destination ring groups and answering machine detection state

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::address::Address;

/// Group of calls ringing several destinations on behalf of one originator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Groupcall {
    pub id: Uuid,
    #[serde(default)]
    pub customer_id: Uuid,
    #[serde(default)]
    pub source: Address,
    #[serde(default)]
    pub destinations: Vec<Address>,
    #[serde(default)]
    pub master_call_id: Uuid,
    #[serde(default)]
    pub call_ids: Vec<Uuid>,
    /// Call that answered, if any
    #[serde(default)]
    pub answer_call_id: Uuid,
}

/// `machine_handle` value that ends the call on machine detection
pub const AMD_MACHINE_HANDLE_HANGUP: &str = "hangup";

/// Detection result reported for an answering machine
pub const AMD_RESULT_MACHINE: &str = "MACHINE";

/// Options cached under the snoop channel id while detection runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CallAmd {
    pub call_id: Uuid,
    #[serde(default)]
    pub machine_handle: String,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

impl CallAmd {
    pub fn hangs_up_machine(&self) -> bool {
        self.machine_handle == AMD_MACHINE_HANDLE_HANGUP
    }
}
