//! Request context with cancellation and deadline support

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Error;

/// Context for plugin operations.
///
/// Every database round-trip made on behalf of a request goes through
/// [`Context::guard`], so cancelling the token or passing the deadline aborts
/// the statement in flight and everything after it.
#[derive(Debug, Clone)]
pub struct Context {
    /// Correlates log lines of one request
    pub request_id: Uuid,
    /// Cooperative cancellation token
    pub cancellation: CancellationToken,
    /// Point in time after which the request is abandoned
    pub deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            cancellation: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Replace the default cancellation token with the provided one.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Whether the request was cancelled or its deadline has passed.
    pub fn interrupted(&self) -> Option<Error> {
        if self.cancellation.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Run `fut` unless the request is cancelled or times out first.
    ///
    /// Cancellation wins ties; `fut` is dropped as soon as either fires.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
        if let Some(err) = self.interrupted() {
            return Err(err);
        }
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            () = deadline => Err(Error::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }
}
