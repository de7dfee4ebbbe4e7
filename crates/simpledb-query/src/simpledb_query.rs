//! SimpleDb Query - SQL building and execution over a connection pool
//!
//! [`SimpleDb`] owns a [`simpledb_connection::ConnectionPool`] and hands out
//! [`Sql`] builders. Results come back as [`simpledb_core::Row`]s, scalars,
//! or any `serde::Deserialize` type.

mod error;
mod simple_db;
mod sql;

pub use error::{QueryError, SqlResult};
pub use simple_db::SimpleDb;
pub use sql::Sql;

#[cfg(test)]
mod tests;
