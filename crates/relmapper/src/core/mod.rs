//! Core building blocks shared by every mapper:
//!
//! - [`value`]: scalar values, records, and primary keys
//! - [`identifier`]: identifier quoting and fragment validation
//! - [`connection`]: the `Connection` trait and its PostgreSQL implementation
//! - [`tls`]: rustls connector setup

pub mod connection;
pub mod identifier;
pub mod tls;
pub mod value;

pub use connection::{Connection, PgConnection};
pub use tls::SslMode;
pub use value::{PkValue, Record, SqlValue};
