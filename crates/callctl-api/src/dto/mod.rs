//! Data Transfer Objects (DTOs) for RPC requests and responses

pub mod calls;
pub mod common;

pub use calls::*;
pub use common::*;
