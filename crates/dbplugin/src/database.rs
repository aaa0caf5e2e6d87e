//! Plugin contract
//!
//! [`Database`] is the surface a plugin host calls. Each operation takes a
//! cancellation-aware [`Context`]; the host is responsible for carrying these
//! calls across its transport and for wrapping the plugin in an
//! [`ErrorSanitizer`](crate::ErrorSanitizer) before errors leave the process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

use crate::context::Context;
use crate::error::Result;
use crate::sanitize::SecretValues;

/// Operator-supplied statement templates for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statements {
    /// Template blocks, each holding one or more `;`-separated statements
    pub commands: Vec<String>,
}

impl Statements {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// True when there is no statement to run once the blocks are split.
    pub fn is_blank(&self) -> bool {
        crate::template::is_blank(&self.commands)
    }
}

/// Hints used to derive a username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsernameMetadata {
    pub display_name: String,
    pub role_name: String,
}

#[derive(Debug, Clone)]
pub struct InitializeRequest {
    /// Untyped connection configuration map
    pub config: serde_json::Value,
    /// Connect and ping before returning
    pub verify_connection: bool,
}

#[derive(Debug, Clone)]
pub struct InitializeResponse {
    /// Configuration the host should persist
    pub config: serde_json::Value,
}

/// Request to create a new database principal.
#[derive(Debug, Clone)]
pub struct NewUserRequest {
    pub username_config: UsernameMetadata,
    /// Creation statements; at least one is required
    pub statements: Statements,
    pub password: SecretString,
    /// Informational; the database does not enforce it
    pub expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserResponse {
    pub username: String,
}

/// Password change, with optional statements overriding the plugin default.
#[derive(Debug, Clone)]
pub struct ChangePassword {
    pub new_password: SecretString,
    pub statements: Statements,
}

/// Expiration change. Recorded by the host; plugins may treat it as a no-op.
#[derive(Debug, Clone)]
pub struct ChangeExpiration {
    pub new_expiration: DateTime<Utc>,
    pub statements: Statements,
}

#[derive(Debug, Clone)]
pub struct UpdateUserRequest {
    pub username: String,
    pub password: Option<ChangePassword>,
    pub expiration: Option<ChangeExpiration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUserResponse {}

/// Request to revoke a principal; empty statements select the plugin default.
#[derive(Debug, Clone)]
pub struct DeleteUserRequest {
    pub username: String,
    pub statements: Statements,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteUserResponse {}

/// A database plugin managing dynamic credentials.
///
/// Implementations must be safe to call concurrently from many callers.
#[async_trait]
pub trait Database: Send + Sync {
    /// Short name of the backend, e.g. `mssql`.
    fn type_name(&self) -> &'static str;

    /// Parse and store the connection configuration.
    async fn initialize(&self, ctx: &Context, req: InitializeRequest)
    -> Result<InitializeResponse>;

    /// Create a principal and return its generated username.
    async fn new_user(&self, ctx: &Context, req: NewUserRequest) -> Result<NewUserResponse>;

    /// Rotate a principal's password or record its new expiration.
    async fn update_user(&self, ctx: &Context, req: UpdateUserRequest)
    -> Result<UpdateUserResponse>;

    /// Revoke a principal.
    async fn delete_user(&self, ctx: &Context, req: DeleteUserRequest)
    -> Result<DeleteUserResponse>;

    /// Release any open connection.
    async fn close(&self) -> Result<()>;

    /// Secret values that must never appear in a surfaced error.
    fn secret_values(&self) -> SecretValues;
}
