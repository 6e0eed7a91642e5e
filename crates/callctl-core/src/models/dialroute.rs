//! Outbound dial routes and carrier providers

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer scoped candidate route for an outbound telephone call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dialroute {
    pub id: Uuid,
    #[serde(default)]
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    #[serde(default)]
    pub priority: i32,
    /// Country calling code or `default`
    #[serde(default)]
    pub target: String,
}

/// Carrier the call is handed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Provider {
    pub id: Uuid,
    pub hostname: String,
    #[serde(default)]
    pub tech_prefix: String,
    #[serde(default)]
    pub tech_postfix: String,
}
