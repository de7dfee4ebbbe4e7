//! MySQL/MariaDB backend for SimpleDb
//!
//! Provides [`MySqlConnection`], a single backend session, and
//! [`MySqlConnectionFactory`], which plugs into the connection pool.

mod connection;
mod factory;
mod value;

pub use connection::MySqlConnection;
pub use factory::{DEFAULT_PORT, MySqlConnectionFactory};
