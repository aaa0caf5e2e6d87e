//! Testing utilities for database plugins
//!
//! [`MockServer`] is a scripted stand-in for a database. It records every
//! call with the transaction it belongs to, keeps a "committed" view in which
//! transactional statements only appear after commit, and can be told to fail
//! or delay statements whose text contains a given needle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::ConnectionSettings;
use crate::connection::{Connection, Connector, Row, SqlValue, Transaction};
use crate::error::DriverError;

/// Record of a call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Ping,
    Close,
    Begin { tx: u64 },
    Execute { tx: Option<u64>, statement: String },
    Query { statement: String, params: Vec<SqlValue> },
    Commit { tx: u64 },
    Rollback { tx: u64 },
}

impl Call {
    /// Transaction this call belongs to, if any.
    pub fn tx(&self) -> Option<u64> {
        match self {
            Self::Begin { tx } | Self::Commit { tx } | Self::Rollback { tx } => Some(*tx),
            Self::Execute { tx, .. } => *tx,
            _ => None,
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    committed: Vec<String>,
    statement_failures: Vec<(String, DriverError)>,
    query_responses: Vec<(String, Result<Vec<Row>, DriverError>)>,
    delays: Vec<(String, Duration)>,
    connect_failure: Option<DriverError>,
    connect_delay: Option<Duration>,
    ping_failure: Option<DriverError>,
    begin_failure: Option<DriverError>,
    commit_failure: Option<DriverError>,
    last_settings: Option<ConnectionSettings>,
    next_tx: u64,
}

impl State {
    fn failure_for(&self, statement: &str) -> Option<DriverError> {
        self.statement_failures
            .iter()
            .find(|(needle, _)| statement.contains(needle.as_str()))
            .map(|(_, err)| err.clone())
    }

    fn delay_for(&self, statement: &str) -> Option<Duration> {
        self.delays
            .iter()
            .find(|(needle, _)| statement.contains(needle.as_str()))
            .map(|(_, delay)| *delay)
    }
}

/// Scripted in-memory database
#[derive(Default)]
pub struct MockServer {
    state: Mutex<State>,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connector handing out connections to this server.
    pub fn connector(self: &Arc<Self>) -> Arc<dyn Connector> {
        Arc::new(MockConnector {
            server: Arc::clone(self),
        })
    }

    /// A connection to this server, without going through a connector.
    pub fn connection(self: &Arc<Self>) -> Arc<dyn Connection> {
        Arc::new(MockConnection {
            server: Arc::clone(self),
            closed: AtomicBool::new(false),
        })
    }

    /// Statements containing `needle` fail with `message`.
    pub fn fail_statement(&self, needle: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .statement_failures
            .push((needle.into(), DriverError::new(message)));
    }

    /// Queries containing `needle` return `rows`.
    pub fn respond(&self, needle: impl Into<String>, rows: Vec<Row>) {
        self.state
            .lock()
            .query_responses
            .push((needle.into(), Ok(rows)));
    }

    /// Queries containing `needle` fail with `message`.
    pub fn fail_query(&self, needle: impl Into<String>, message: impl Into<String>) {
        self.state
            .lock()
            .query_responses
            .push((needle.into(), Err(DriverError::new(message))));
    }

    /// Statements and queries containing `needle` take `delay` to run.
    pub fn delay_statement(&self, needle: impl Into<String>, delay: Duration) {
        self.state.lock().delays.push((needle.into(), delay));
    }

    /// Connects take `delay` before handing out the connection.
    pub fn delay_connect(&self, delay: Duration) {
        self.state.lock().connect_delay = Some(delay);
    }

    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state.lock().connect_failure = Some(DriverError::new(message));
    }

    pub fn fail_ping(&self, message: impl Into<String>) {
        self.state.lock().ping_failure = Some(DriverError::new(message));
    }

    pub fn fail_begin(&self, message: impl Into<String>) {
        self.state.lock().begin_failure = Some(DriverError::new(message));
    }

    pub fn fail_commit(&self, message: impl Into<String>) {
        self.state.lock().commit_failure = Some(DriverError::new(message));
    }

    /// Every call in the order it started.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Text of every executed statement (autocommit or transactional), in order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Execute { statement, .. } => Some(statement.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text of every query, in order.
    pub fn queries(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Query { statement, .. } => Some(statement.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statements whose effects persisted.
    pub fn committed(&self) -> Vec<String> {
        self.state.lock().committed.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.count(|call| matches!(call, Call::Connect))
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Settings passed to the most recent successful connect.
    pub fn last_settings(&self) -> Option<ConnectionSettings> {
        self.state.lock().last_settings.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }

    async fn run_statement(&self, tx: Option<u64>, statement: &str) -> Result<u64, DriverError> {
        let (delay, failure) = {
            let mut state = self.state.lock();
            state.calls.push(Call::Execute {
                tx,
                statement: statement.to_owned(),
            });
            (state.delay_for(statement), state.failure_for(statement))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(err) => Err(err),
            None => {
                if tx.is_none() {
                    self.state.lock().committed.push(statement.to_owned());
                }
                Ok(1)
            }
        }
    }
}

struct MockConnector {
    server: Arc<MockServer>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Connection>, DriverError> {
        let delay = {
            let mut state = self.server.state.lock();
            state.calls.push(Call::Connect);
            if let Some(err) = state.connect_failure.clone() {
                return Err(err);
            }
            state.last_settings = Some(settings.clone());
            state.connect_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.server.connection())
    }
}

struct MockConnection {
    server: Arc<MockServer>,
    closed: AtomicBool,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverError::new("connection is closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&self, statement: &str, _params: &[SqlValue]) -> Result<u64, DriverError> {
        self.ensure_open()?;
        self.server.run_statement(None, statement).await
    }

    async fn query(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        self.ensure_open()?;
        let (delay, response) = {
            let mut state = self.server.state.lock();
            state.calls.push(Call::Query {
                statement: statement.to_owned(),
                params: params.to_vec(),
            });
            let response = state
                .query_responses
                .iter()
                .find(|(needle, _)| statement.contains(needle.as_str()))
                .map(|(_, response)| response.clone());
            (state.delay_for(statement), response)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DriverError> {
        self.ensure_open()?;
        let id = {
            let mut state = self.server.state.lock();
            if let Some(err) = state.begin_failure.clone() {
                return Err(err);
            }
            state.next_tx += 1;
            let id = state.next_tx;
            state.calls.push(Call::Begin { tx: id });
            id
        };
        Ok(Box::new(MockTransaction {
            server: Arc::clone(&self.server),
            id,
            pending: Vec::new(),
        }))
    }

    async fn ping(&self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut state = self.server.state.lock();
        state.calls.push(Call::Ping);
        match state.ping_failure.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.closed.store(true, Ordering::SeqCst);
        self.server.record(Call::Close);
        Ok(())
    }
}

struct MockTransaction {
    server: Arc<MockServer>,
    id: u64,
    pending: Vec<String>,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(
        &mut self,
        statement: &str,
        _params: &[SqlValue],
    ) -> Result<u64, DriverError> {
        let affected = self.server.run_statement(Some(self.id), statement).await?;
        self.pending.push(statement.to_owned());
        Ok(affected)
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        let MockTransaction {
            server,
            id,
            pending,
        } = *self;
        let mut state = server.state.lock();
        state.calls.push(Call::Commit { tx: id });
        if let Some(err) = state.commit_failure.clone() {
            return Err(err);
        }
        state.committed.extend(pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.server.record(Call::Rollback { tx: self.id });
        Ok(())
    }
}
