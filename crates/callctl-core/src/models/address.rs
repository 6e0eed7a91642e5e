//! Call source/destination addresses

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    #[default]
    #[serde(rename = "")]
    None,
    Agent,
    Conference,
    Endpoint,
    Extension,
    Line,
    Sip,
    Tel,
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::None => write!(f, ""),
            AddressType::Agent => write!(f, "agent"),
            AddressType::Conference => write!(f, "conference"),
            AddressType::Endpoint => write!(f, "endpoint"),
            AddressType::Extension => write!(f, "extension"),
            AddressType::Line => write!(f, "line"),
            AddressType::Sip => write!(f, "sip"),
            AddressType::Tel => write!(f, "tel"),
        }
    }
}

/// A call party address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(rename = "type", default)]
    pub kind: AddressType,

    /// Phone number, SIP URI, or resource id depending on `kind`
    #[serde(default)]
    pub target: String,

    /// Display name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// Caller id target used when the real one can't be presented
pub const ANONYMOUS_TARGET: &str = "anonymous";

impl Address {
    pub fn new(kind: AddressType, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn tel(target: impl Into<String>) -> Self {
        Self::new(AddressType::Tel, target)
    }

    pub fn sip(target: impl Into<String>) -> Self {
        Self::new(AddressType::Sip, target)
    }

    /// Whether this address can be dialed directly as a single channel
    pub fn is_dialable(&self) -> bool {
        matches!(self.kind, AddressType::Sip | AddressType::Tel)
    }

    /// Whether this address expands into several destinations rung by the groupcall coordinator
    pub fn is_groupcall_type(&self) -> bool {
        matches!(
            self.kind,
            AddressType::Agent | AddressType::Extension | AddressType::Endpoint
        )
    }

    /// Anonymous caller presentation, keeps the original address type
    pub fn anonymous_of(&self) -> Self {
        Self {
            kind: self.kind,
            target: ANONYMOUS_TARGET.to_string(),
            target_name: "Anonymous".to_string(),
            ..Default::default()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.target == ANONYMOUS_TARGET
    }

    /// Country calling code of an E.164 telephone number, e.g. `+82` for `+821012345678`
    pub fn country_calling_code(&self) -> Option<String> {
        if self.kind != AddressType::Tel {
            return None;
        }
        country_calling_code(&self.target)
    }
}

/// ITU-T E.164 country calling codes of length one and two.
/// Anything else starting with a valid digit is a three digit code.
const CALLING_CODES_1: &[&str] = &["1", "7"];
const CALLING_CODES_2: &[&str] = &[
    "20", "27", "30", "31", "32", "33", "34", "36", "39", "40", "41", "43", "44", "45", "46", "47",
    "48", "49", "51", "52", "53", "54", "55", "56", "57", "58", "60", "61", "62", "63", "64", "65",
    "66", "81", "82", "84", "86", "90", "91", "92", "93", "94", "95", "98",
];

/// Parse the country calling code of an E.164 number (`+` followed by 8-15 digits)
pub fn country_calling_code(number: &str) -> Option<String> {
    let digits = number.strip_prefix('+')?;
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.starts_with('0') {
        return None;
    }

    let code = if CALLING_CODES_1.contains(&&digits[..1]) {
        &digits[..1]
    } else if CALLING_CODES_2.contains(&&digits[..2]) {
        &digits[..2]
    } else {
        &digits[..3]
    };

    Some(format!("+{}", code))
}
