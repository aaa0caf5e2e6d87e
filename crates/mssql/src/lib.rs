//! # SQL Server credential plugin
//!
//! Creates, rotates and revokes short-lived SQL Server logins on behalf of a
//! plugin host. Statement templates come from the operator; revocation falls
//! back to a built-in cascade (see [`revoke`]) when none are given.
//!
//! ```ignore
//! let plugin = keyline_mssql::new(connector);
//! plugin.initialize(&ctx, InitializeRequest { config, verify_connection: true }).await?;
//! ```
#![forbid(unsafe_code)]

mod mssql;
pub mod revoke;
pub mod sql;

use std::sync::Arc;

use keyline_dbplugin::{Connector, ErrorSanitizer};

pub use mssql::{LockPolicy, MsSql, TYPE_NAME};
pub use revoke::RevocationPlan;

/// A plugin connected through `connector`, with secrets stripped from its errors.
pub fn new(connector: Arc<dyn Connector>) -> ErrorSanitizer<MsSql> {
    ErrorSanitizer::new(MsSql::new(connector))
}
