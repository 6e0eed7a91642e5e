//! Repository implementations
//!
//! Concrete implementations of the store traits defined in callctl-core,
//! using sqlx for PostgreSQL access.

pub mod call_repo;

pub use call_repo::{PgCallRepository, PgCallTransaction};
