//! Error types for database plugin operations
//!
//! Every failure a plugin can surface is a variant of [`Error`]. Statement
//! failures keep the offending statement text next to the driver error so an
//! operator can tell exactly what ran; best-effort batches collect them into an
//! [`AggregatedError`] instead of stopping at the first one.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::sanitize::SecretValues;

/// Result type for plugin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Opaque error reported by a database driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    /// Vendor error number, when the driver reports one
    pub code: Option<i32>,
    /// Driver message
    pub message: String,
}

impl DriverError {
    /// Create a driver error without a vendor code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Attach a vendor error number.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    fn redact(self, secrets: &SecretValues) -> Self {
        Self {
            code: self.code,
            message: secrets.apply(&self.message),
        }
    }
}

/// A single statement that failed to execute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to execute query `{statement}`: {source}")]
pub struct ExecutionError {
    /// The statement text as it was sent to the database
    pub statement: String,
    /// What the driver reported
    #[source]
    pub source: DriverError,
}

impl ExecutionError {
    pub fn new(statement: impl Into<String>, source: DriverError) -> Self {
        Self {
            statement: statement.into(),
            source,
        }
    }

    fn redact(self, secrets: &SecretValues) -> Self {
        Self {
            statement: secrets.apply(&self.statement),
            source: self.source.redact(secrets),
        }
    }
}

/// Failures collected from a batch that attempts every statement.
///
/// Entries keep the order in which statements ran. An empty collection means
/// the batch succeeded; see [`AggregatedError::into_result`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedError {
    errors: Vec<ExecutionError>,
}

impl AggregatedError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failed statement.
    pub fn push(&mut self, error: ExecutionError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ExecutionError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionError> {
        self.errors.iter()
    }

    /// `Ok(())` when nothing failed, otherwise the collection itself.
    pub fn into_result(self) -> std::result::Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    fn redact(self, secrets: &SecretValues) -> Self {
        Self {
            errors: self
                .errors
                .into_iter()
                .map(|e| e.redact(secrets))
                .collect(),
        }
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => return f.write_str("no errors occurred"),
            1 => f.write_str("1 error occurred:")?,
            n => write!(f, "{n} errors occurred:")?,
        }
        for error in &self.errors {
            write!(f, "\n\t* {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl FromIterator<ExecutionError> for AggregatedError {
    fn from_iter<I: IntoIterator<Item = ExecutionError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}

/// What a revocation cascade failed to enumerate while building its plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationTarget {
    /// Active sessions authenticated as the login
    Sessions,
    /// Databases holding a user mapped to the login
    LoginMappings,
}

impl fmt::Display for EnumerationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sessions => f.write_str("active sessions"),
            Self::LoginMappings => f.write_str("database principal mappings"),
        }
    }
}

/// Errors surfaced by database plugin operations
#[derive(Debug, Error)]
pub enum Error {
    /// Connection configuration is missing or invalid
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    /// An operation was called before `initialize`
    #[error("plugin has not been initialized")]
    NotInitialized,

    /// The connection could not be opened or verified
    #[error("unable to get connection: {0}")]
    Connection(#[source] DriverError),

    /// User creation was requested without any creation statements
    #[error("empty creation statements")]
    EmptyStatement,

    /// An update carried neither a password nor an expiration change
    #[error("no changes requested")]
    NoChangeRequested,

    /// A required argument was missing or empty
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A single statement failed
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The principal was reported missing before its alteration failed
    #[error("login {username} does not exist: {source}")]
    PrincipalNotFound {
        username: String,
        #[source]
        source: ExecutionError,
    },

    /// A transaction could not be opened
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] DriverError),

    /// A transaction could not be committed; the resulting state is undefined
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] DriverError),

    /// A best-effort batch finished with failures
    #[error(transparent)]
    Aggregated(#[from] AggregatedError),

    /// The cleanup phase of a revocation did not complete
    #[error("could not perform all sql statements: {0}")]
    Cleanup(#[source] AggregatedError),

    /// A revocation could not enumerate what it has to remove
    ///
    /// `cleanup` holds the statements that failed among those already
    /// planned; it is empty when enumeration stopped the revocation first.
    #[error("could not enumerate {target}: {source}{}", cleanup_note(.cleanup))]
    Enumeration {
        target: EnumerationTarget,
        #[source]
        source: DriverError,
        cleanup: AggregatedError,
    },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation finished
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

fn cleanup_note(cleanup: &AggregatedError) -> String {
    if cleanup.is_empty() {
        String::new()
    } else {
        format!("; cleanup also failed: {cleanup}")
    }
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True for errors caused by the caller giving up rather than the database.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Rewrite every string carried by this error with `secrets`.
    ///
    /// Statement text and driver messages can both echo a password back, so
    /// both are rewritten. Variants without text are returned unchanged.
    pub fn redact(self, secrets: &SecretValues) -> Self {
        if secrets.is_empty() {
            return self;
        }
        match self {
            Self::Configuration(e) => Self::Configuration(e.redact(secrets)),
            Self::Connection(e) => Self::Connection(e.redact(secrets)),
            Self::InvalidArgument(m) => Self::InvalidArgument(secrets.apply(&m)),
            Self::Execution(e) => Self::Execution(e.redact(secrets)),
            Self::PrincipalNotFound { username, source } => Self::PrincipalNotFound {
                username: secrets.apply(&username),
                source: source.redact(secrets),
            },
            Self::Begin(e) => Self::Begin(e.redact(secrets)),
            Self::Commit(e) => Self::Commit(e.redact(secrets)),
            Self::Aggregated(e) => Self::Aggregated(e.redact(secrets)),
            Self::Cleanup(e) => Self::Cleanup(e.redact(secrets)),
            Self::Enumeration {
                target,
                source,
                cleanup,
            } => Self::Enumeration {
                target,
                source: source.redact(secrets),
                cleanup: cleanup.redact(secrets),
            },
            other @ (Self::NotInitialized
            | Self::EmptyStatement
            | Self::NoChangeRequested
            | Self::Cancelled
            | Self::DeadlineExceeded) => other,
        }
    }
}
