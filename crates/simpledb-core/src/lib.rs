//! SimpleDb Core - Core abstractions shared by the SimpleDb crates
//!
//! This crate defines:
//!
//! - `Connection` - Trait for a live backend session
//! - `ConnectionConfig` - Backend address and credentials
//! - Common types like `Value`, `Row`, `QueryResult`, `StatementResult`
//! - `DbError` - The error type returned by backend operations

mod config;
mod connection;
mod error;
mod types;

pub use config::*;
pub use connection::*;
pub use error::*;
pub use types::*;
