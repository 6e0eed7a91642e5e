//! callctl Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the callctl call-control plane. It includes:
//!
//! - Domain models (Call, Action, Channel, Dialroute, etc.)
//! - Collaborator traits for the call store, channel adapter and peer services
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::{AppConfig, CallSettings};
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
