//! Query execution
//!
//! Runs already-expanded statements against either a plain connection
//! (autocommit) or an open transaction. Nothing is retried: a failing
//! statement comes back as an [`ExecutionError`] and the caller decides
//! whether the batch stops (transactional) or continues (best effort).

use tracing::{debug, warn};

use crate::connection::{Connection, SqlValue, Transaction};
use crate::context::Context;
use crate::error::{AggregatedError, Error, ExecutionError, Result};

/// Where a statement runs.
pub enum Target<'a> {
    /// Autocommit: each statement is its own implicit transaction
    Connection(&'a dyn Connection),
    /// Part of a transaction shared across the batch
    Transaction(&'a mut dyn Transaction),
}

/// Execute one statement, returning the affected row count.
pub async fn execute(
    ctx: &Context,
    target: Target<'_>,
    statement: &str,
    params: &[SqlValue],
) -> Result<u64> {
    let result = match target {
        Target::Connection(conn) => ctx.guard(conn.execute(statement, params)).await?,
        Target::Transaction(tx) => ctx.guard(tx.execute(statement, params)).await?,
    };
    result.map_err(|source| Error::Execution(ExecutionError::new(statement, source)))
}

/// Run `statements` in one transaction on `conn`.
///
/// The first failure, cancellation or deadline rolls the transaction back and
/// is returned; nothing from the batch persists. A commit failure is returned
/// as [`Error::Commit`] and leaves the outcome undefined.
pub async fn execute_in_transaction(
    ctx: &Context,
    conn: &dyn Connection,
    statements: &[String],
) -> Result<()> {
    let mut tx = ctx.guard(conn.begin()).await?.map_err(Error::Begin)?;

    for (index, statement) in statements.iter().enumerate() {
        debug!(index, total = statements.len(), "Executing statement in transaction");
        let result = execute(ctx, Target::Transaction(tx.as_mut()), statement, &[]).await;
        if let Err(err) = result {
            // Rollback is not guarded: it has to run even after cancellation.
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed after statement error");
            }
            return Err(err);
        }
    }

    if let Some(err) = ctx.interrupted() {
        if let Err(rollback_err) = tx.rollback().await {
            warn!(error = %rollback_err, "Rollback failed after interruption");
        }
        return Err(err);
    }

    tx.commit().await.map_err(Error::Commit)
}

/// Run every statement on `conn`, continuing past failures.
///
/// Returns the failures in execution order; an empty collection means every
/// statement succeeded. Cancellation or a passed deadline stops the batch at
/// once and is returned as the error; statements that already ran stay applied.
pub async fn execute_best_effort(
    ctx: &Context,
    conn: &dyn Connection,
    statements: &[String],
) -> Result<AggregatedError> {
    let mut failures = AggregatedError::new();
    for (index, statement) in statements.iter().enumerate() {
        match execute(ctx, Target::Connection(conn), statement, &[]).await {
            Ok(_) => debug!(index, total = statements.len(), "Statement executed"),
            Err(Error::Execution(err)) => {
                warn!(index, error = %err.source, "Statement failed, continuing");
                failures.push(err);
            }
            Err(other) => return Err(other),
        }
    }
    Ok(failures)
}
