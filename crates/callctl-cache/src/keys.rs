//! Cache key constants and builders for callctl
//!
//! # Key Patterns
//!
//! - `amd:{snoop_id}` - Answering machine detection options of a running snoop channel
//!
//! # Example
//!
//! ```
//! use callctl_cache::keys;
//!
//! assert_eq!(keys::amd_key("snoop-1"), "amd:snoop-1");
//! ```

/// Prefix for answering machine detection options
///
/// Format: `amd:{snoop_id}`
pub const AMD_PREFIX: &str = "amd";

/// Default TTL for detection options (24 hours)
pub const AMD_TTL_SECS: u64 = 86400;

/// Build a cache key for the detection options of a snoop channel
pub fn amd_key(snoop_id: &str) -> String {
    format!("{}:{}", AMD_PREFIX, snoop_id)
}
