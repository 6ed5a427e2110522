//! Repository functions — one function per database operation.
//!
//! Every function takes a `&DbPool` and returns a `Result<T, DbError>`.
//! No business logic, no status-machine checks — pure SQL plus the row
//! conversions from [`crate::models`].

pub mod executions;
pub mod workflows;
