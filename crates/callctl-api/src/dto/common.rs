//! Common DTOs used across the RPC surface

use callctl_core::{models::CallStatus, traits::CallFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Standard response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    /// Create a success response with data and message
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Token paged list of items
///
/// `next_page_token` is the creation time of the last item, to be passed back as
/// `page_token` for the following page.
#[derive(Debug, Clone, Serialize)]
pub struct PagedResponse<T> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<DateTime<Utc>>,
}

/// Query parameters of the call listing
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CallListParams {
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: u64,

    /// Only calls created before this time
    pub page_token: Option<DateTime<Utc>>,

    pub customer_id: Option<Uuid>,

    pub status: Option<CallStatus>,

    /// Include soft deleted calls
    #[serde(default)]
    pub deleted: bool,
}

fn default_page_size() -> u64 {
    10
}

impl Default for CallListParams {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_token: None,
            customer_id: None,
            status: None,
            deleted: false,
        }
    }
}

impl CallListParams {
    pub fn filter(&self) -> CallFilter {
        CallFilter {
            customer_id: self.customer_id,
            status: self.status,
            deleted: if self.deleted { None } else { Some(false) },
        }
    }
}
