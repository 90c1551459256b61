//! Configuration-driven SQL metadata reader.
//!
//! Named SQL templates are compiled once per connection; requests name
//! variables or queries and receive merged [`Values`].

pub mod config;
pub mod connection;
pub mod error;
pub mod reader;
pub mod sql;
pub mod values;

pub use config::{DatabaseConfig, QueriesConfig, QueryTemplate, ReaderConfig};
pub use connection::{ColumnMeta, ColumnType, Connection, Connector, PgConnector, ResultRows};
pub use error::{DbError, ReaderError, Result};
pub use reader::{ConnectionState, GenericReader};
pub use values::{SqlValue, Values};
