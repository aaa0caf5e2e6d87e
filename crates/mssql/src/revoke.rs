//! Default login revocation
//!
//! Without operator statements a login is torn down in four phases:
//!
//! 1. disable the login so no new session can authenticate
//! 2. kill its active sessions
//! 3. drop the user it maps to in every database
//! 4. drop the login itself
//!
//! Phases 2 and 3 run best effort. The login is only dropped once both
//! enumerations succeeded and every cleanup statement took effect; anything
//! less leaves a disabled login behind for the next attempt.

use keyline_dbplugin::executor::{self, Target};
use keyline_dbplugin::{
    AggregatedError, Connection, Context, DriverError, EnumerationTarget, Error, Result, Row,
};
use tracing::{debug, info, warn};

use crate::sql;

/// Statements revoking one login, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationPlan {
    pub disable: String,
    pub kill_sessions: Vec<String>,
    pub drop_users: Vec<String>,
    pub drop_login: String,
}

impl RevocationPlan {
    /// Plan with no sessions or database users yet.
    pub fn new(username: &str) -> Self {
        Self {
            disable: sql::disable_login(username),
            kill_sessions: Vec::new(),
            drop_users: Vec::new(),
            drop_login: sql::drop_login(username),
        }
    }

    /// Add a `KILL` for every session id in `rows`.
    pub fn add_sessions(&mut self, rows: &[Row]) -> std::result::Result<(), DriverError> {
        for row in rows {
            self.kill_sessions.push(sql::kill_session(row.int(0)?));
        }
        Ok(())
    }

    /// Add a user drop for every database in the login mapping `rows`.
    ///
    /// Rows without a database name carry no user and are skipped.
    pub fn add_mappings(
        &mut self,
        username: &str,
        rows: &[Row],
    ) -> std::result::Result<(), DriverError> {
        for row in rows {
            if let Some(database) = row.opt_text(sql::MAPPING_DATABASE_COLUMN)? {
                self.drop_users.push(sql::drop_user(database, username));
            }
        }
        Ok(())
    }

    /// Session kills followed by user drops.
    pub fn cleanup(&self) -> Vec<String> {
        self.kill_sessions
            .iter()
            .chain(&self.drop_users)
            .cloned()
            .collect()
    }

    /// Every statement of the plan.
    pub fn statements(&self) -> Vec<String> {
        let mut all = vec![self.disable.clone()];
        all.extend(self.cleanup());
        all.push(self.drop_login.clone());
        all
    }
}

/// Revoke `username` on `conn` with the four-phase cascade.
pub(crate) async fn revoke_login(
    ctx: &Context,
    conn: &dyn Connection,
    username: &str,
) -> Result<()> {
    let mut plan = RevocationPlan::new(username);

    executor::execute(ctx, Target::Connection(conn), &plan.disable, &[]).await?;
    debug!(username, "Login disabled");

    ctx.guard(conn.query(sql::SESSIONS_SQL, &[username.into()]))
        .await?
        .and_then(|rows| plan.add_sessions(&rows))
        .map_err(|source| Error::Enumeration {
            target: EnumerationTarget::Sessions,
            source,
            cleanup: AggregatedError::new(),
        })?;

    // A mapping failure must not keep the sessions found above alive.
    let mapping_failure = ctx
        .guard(conn.query(sql::LOGIN_MAPPINGS_SQL, &[username.into()]))
        .await?
        .and_then(|rows| plan.add_mappings(username, &rows))
        .err();

    debug!(
        username,
        sessions = plan.kill_sessions.len(),
        databases = plan.drop_users.len(),
        "Revocation planned"
    );

    let failures = executor::execute_best_effort(ctx, conn, &plan.cleanup()).await?;

    if let Some(source) = mapping_failure {
        warn!(
            username,
            failures = failures.len(),
            "Login left disabled, database mappings unknown"
        );
        return Err(Error::Enumeration {
            target: EnumerationTarget::LoginMappings,
            source,
            cleanup: failures,
        });
    }
    if !failures.is_empty() {
        warn!(
            username,
            failures = failures.len(),
            "Login left disabled, cleanup incomplete"
        );
        return Err(Error::Cleanup(failures));
    }

    executor::execute(ctx, Target::Connection(conn), &plan.drop_login, &[]).await?;
    info!(username, "Login revoked");
    Ok(())
}
