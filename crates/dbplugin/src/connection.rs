//! Driver seam
//!
//! Plugins never talk to a driver directly. A [`Connector`] opens a
//! [`Connection`] from validated [`ConnectionSettings`]; the connection runs
//! autocommit statements and opens [`Transaction`]s. Every call reports a
//! [`DriverError`] on failure and is made through a request
//! [`Context`](crate::Context) by the caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConnectionSettings;
use crate::error::DriverError;

/// A parameter or result cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One result row, cells in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Column `index` as a non-null integer.
    pub fn int(&self, index: usize) -> Result<i64, DriverError> {
        match self.column(index)? {
            SqlValue::Int(n) => Ok(*n),
            SqlValue::Text(s) => s.trim().parse().map_err(|_| {
                DriverError::new(format!("column {index}: cannot convert {s:?} to an integer"))
            }),
            SqlValue::Null => Err(DriverError::new(format!(
                "column {index}: unexpected NULL, expected an integer"
            ))),
        }
    }

    /// Column `index` as nullable text.
    pub fn opt_text(&self, index: usize) -> Result<Option<&str>, DriverError> {
        match self.column(index)? {
            SqlValue::Text(s) => Ok(Some(s)),
            SqlValue::Null => Ok(None),
            SqlValue::Int(_) => Err(DriverError::new(format!(
                "column {index}: expected text, found an integer"
            ))),
        }
    }

    fn column(&self, index: usize) -> Result<&SqlValue, DriverError> {
        self.values.get(index).ok_or_else(|| {
            DriverError::new(format!(
                "column {index} out of range for a row with {} columns",
                self.values.len()
            ))
        })
    }
}

impl From<Vec<SqlValue>> for Row {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::new(values)
    }
}

/// An open, authenticated database handle shared by concurrent callers.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run one statement in its own implicit transaction.
    async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<u64, DriverError>;

    /// Run a query and collect its rows.
    async fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError>;

    /// Round-trip to check the connection is usable.
    async fn ping(&self) -> Result<(), DriverError>;

    /// Release the handle. Further calls may fail.
    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// A transaction opened by [`Connection::begin`].
///
/// Dropping a transaction without committing it must not commit it; callers
/// roll back explicitly on every failure path.
#[async_trait]
pub trait Transaction: Send {
    async fn execute(&mut self, statement: &str, params: &[SqlValue])
    -> Result<u64, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;
}

/// Opens connections for a plugin.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Connection>, DriverError>;
}
