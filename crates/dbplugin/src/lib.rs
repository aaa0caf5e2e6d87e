//! # Keyline database plugin contract
//!
//! Building blocks shared by database credential plugins:
//!
//! - [`Database`]: the operations a plugin host calls (initialize, create,
//!   update and delete users), each with a cancellation-aware [`Context`]
//! - [`template`]: `;`-separated statement templates with `{{name}}`-style
//!   placeholders
//! - [`executor`]: single statements, all-or-nothing transactional batches
//!   and best-effort batches that collect failures in an [`AggregatedError`]
//! - [`Connector`] / [`Connection`] / [`Transaction`]: the driver seam, and a
//!   lazily connected [`ConnectionProducer`]
//! - [`ErrorSanitizer`]: strips secrets from every error a plugin returns
#![forbid(unsafe_code)]

pub mod config;
pub mod connection;
pub mod context;
pub mod database;
pub mod error;
pub mod executor;
pub mod producer;
pub mod sanitize;
pub mod template;
pub mod username;

#[cfg(feature = "test-util")]
pub mod testing;

pub use config::{ConfigError, ConnectionConfig, ConnectionSettings};
pub use connection::{Connection, Connector, Row, SqlValue, Transaction};
pub use context::Context;
pub use database::{
    ChangeExpiration, ChangePassword, Database, DeleteUserRequest, DeleteUserResponse,
    InitializeRequest, InitializeResponse, NewUserRequest, NewUserResponse, Statements,
    UpdateUserRequest, UpdateUserResponse, UsernameMetadata,
};
pub use error::{
    AggregatedError, DriverError, EnumerationTarget, Error, ExecutionError, Result,
};
pub use producer::ConnectionProducer;
pub use sanitize::{ErrorSanitizer, REDACTED, SecretValues};
pub use template::{Placeholder, Placeholders};
pub use username::UsernameGenerator;
