//! `db` crate — pure persistence layer.
//!
//! Provides the SQLite connection pool, row structs mapping the two tables,
//! and repository functions for every database operation. No business logic
//! lives here; domain types come from the `engine` crate and cross the
//! boundary through the row conversions in [`models`].

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use pool::DbPool;
