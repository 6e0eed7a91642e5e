//! callctl Database Layer
//!
//! This crate provides PostgreSQL access for the call record store. It includes:
//!
//! - Connection pool management with sqlx
//! - Embedded schema migrations
//! - The `calls` repository with single-field setters
//! - Row-locking transactions for chained call linking

pub mod pool;
pub mod repositories;

pub use pool::{create_pool, run_migrations};
pub use repositories::*;

// Re-export commonly used types
pub use callctl_core::{AppError, AppResult};
pub use sqlx::PgPool;
