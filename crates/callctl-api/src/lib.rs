//! RPC layer for callctl
//!
//! HTTP handlers exposing the call handler to peer services: call creation
//! and queries, scheduler callbacks, media controls and signaling events.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod dto;
pub mod handlers;

pub use dto::ApiResponse;
pub use handlers::configure;
