//! SQL Server implementation of the plugin contract

use std::sync::Arc;

use async_trait::async_trait;
use keyline_dbplugin::executor;
use keyline_dbplugin::{
    ChangePassword, Connection, ConnectionProducer, Connector, Context, Database,
    DeleteUserRequest, DeleteUserResponse, Error, InitializeRequest, InitializeResponse,
    NewUserRequest, NewUserResponse, Placeholder, Placeholders, Result, SecretValues,
    UpdateUserRequest, UpdateUserResponse, UsernameGenerator,
};
use secrecy::ExposeSecret;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{revoke, sql};

/// Backend name reported to the host
pub const TYPE_NAME: &str = "mssql";

/// Format of the `{{expiration}}` placeholder
const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Which operations share the plugin's operation lock.
///
/// Creation and rotation always take it. Revocation does not by default, so a
/// slow create cannot hold up the removal of a leaked credential.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockPolicy {
    /// Make revocation take the lock as well
    pub serialize_revocation: bool,
}

impl LockPolicy {
    pub fn serialized() -> Self {
        Self {
            serialize_revocation: true,
        }
    }
}

/// SQL Server implementation of [`Database`].
///
/// Usually built with [`crate::new`], which also wraps it in an error sanitizer.
pub struct MsSql {
    producer: ConnectionProducer,
    op_lock: Mutex<()>,
    lock_policy: LockPolicy,
    usernames: UsernameGenerator,
}

impl std::fmt::Debug for MsSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsSql")
            .field("producer", &self.producer)
            .field("lock_policy", &self.lock_policy)
            .field("usernames", &self.usernames)
            .finish_non_exhaustive()
    }
}

impl MsSql {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            producer: ConnectionProducer::new(connector),
            op_lock: Mutex::new(()),
            lock_policy: LockPolicy::default(),
            usernames: UsernameGenerator::default(),
        }
    }

    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    #[must_use]
    pub fn with_username_generator(mut self, usernames: UsernameGenerator) -> Self {
        self.usernames = usernames;
        self
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.lock_policy
    }

    async fn lock(&self, ctx: &Context) -> Result<MutexGuard<'_, ()>> {
        ctx.guard(self.op_lock.lock()).await
    }

    async fn change_password(
        &self,
        ctx: &Context,
        username: &str,
        change: ChangePassword,
    ) -> Result<()> {
        let password = change.new_password.expose_secret();
        if username.is_empty() || password.is_empty() {
            return Err(Error::invalid_argument(
                "must provide both username and password to change the password",
            ));
        }

        let blocks = if change.statements.is_blank() {
            vec![sql::ALTER_LOGIN_SQL.to_owned()]
        } else {
            change.statements.commands
        };
        let statements = Placeholders::new()
            .with(Placeholder::Name, username)
            .with(Placeholder::Username, username)
            .with(Placeholder::Password, password)
            .expand_all(&blocks);

        let _guard = self.lock(ctx).await?;
        let conn = self.producer.connection(ctx).await?;
        let exists = login_exists(ctx, conn.as_ref(), username).await?;

        debug!(username, statements = statements.len(), "Rotating password");
        match executor::execute_in_transaction(ctx, conn.as_ref(), &statements).await {
            Ok(()) => {
                info!(username, "Password rotated");
                Ok(())
            }
            Err(Error::Execution(source)) if exists == Some(false) => {
                Err(Error::PrincipalNotFound {
                    username: username.to_owned(),
                    source,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Whether the login exists, or `None` when the probe itself failed.
async fn login_exists(
    ctx: &Context,
    conn: &dyn Connection,
    username: &str,
) -> Result<Option<bool>> {
    match ctx
        .guard(conn.query(sql::LOGIN_EXISTS_SQL, &[username.into()]))
        .await?
    {
        Ok(rows) => Ok(Some(!rows.is_empty())),
        Err(e) => {
            warn!(username, error = %e, "Login existence probe failed");
            Ok(None)
        }
    }
}

#[async_trait]
impl Database for MsSql {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn initialize(
        &self,
        ctx: &Context,
        req: InitializeRequest,
    ) -> Result<InitializeResponse> {
        self.producer
            .init(ctx, &req.config, req.verify_connection)
            .await?;
        info!(
            request_id = %ctx.request_id,
            verified = req.verify_connection,
            "Plugin initialized"
        );
        Ok(InitializeResponse { config: req.config })
    }

    async fn new_user(&self, ctx: &Context, req: NewUserRequest) -> Result<NewUserResponse> {
        if req.statements.is_blank() {
            return Err(Error::EmptyStatement);
        }
        let password = req.password.expose_secret();

        let result = async {
            let _guard = self.lock(ctx).await?;
            let conn = self.producer.connection(ctx).await?;

            let username = self.usernames.generate(&req.username_config)?;
            let statements = Placeholders::new()
                .with(Placeholder::Name, &username)
                .with(Placeholder::Password, password)
                .with(
                    Placeholder::Expiration,
                    req.expiration.format(EXPIRATION_FORMAT).to_string(),
                )
                .expand_all(&req.statements.commands);

            debug!(username = %username, statements = statements.len(), "Creating login");
            executor::execute_in_transaction(ctx, conn.as_ref(), &statements).await?;
            info!(request_id = %ctx.request_id, username = %username, "Login created");
            Ok::<_, Error>(NewUserResponse { username })
        }
        .await;

        result.map_err(|e| e.redact(&SecretValues::redacting([password])))
    }

    async fn update_user(
        &self,
        ctx: &Context,
        req: UpdateUserRequest,
    ) -> Result<UpdateUserResponse> {
        match (req.password, req.expiration) {
            (None, None) => return Err(Error::NoChangeRequested),
            (Some(change), _) => {
                let secrets = SecretValues::redacting([change.new_password.expose_secret()]);
                self.change_password(ctx, &req.username, change)
                    .await
                    .map_err(|e| e.redact(&secrets))?;
            }
            (None, Some(_)) => {
                debug!(username = %req.username, "Expiration change needs no database work");
            }
        }
        Ok(UpdateUserResponse {})
    }

    async fn delete_user(
        &self,
        ctx: &Context,
        req: DeleteUserRequest,
    ) -> Result<DeleteUserResponse> {
        if req.username.is_empty() {
            return Err(Error::invalid_argument("username is required to revoke a login"));
        }

        let _guard = if self.lock_policy.serialize_revocation {
            Some(self.lock(ctx).await?)
        } else {
            None
        };
        let conn = self.producer.connection(ctx).await?;

        if req.statements.is_blank() {
            revoke::revoke_login(ctx, conn.as_ref(), &req.username).await?;
            return Ok(DeleteUserResponse {});
        }

        let statements = Placeholders::new()
            .with(Placeholder::Name, &req.username)
            .expand_all(&req.statements.commands);
        debug!(
            username = %req.username,
            statements = statements.len(),
            "Revoking with operator statements"
        );

        let failures = executor::execute_best_effort(ctx, conn.as_ref(), &statements).await?;
        failures.into_result().map_err(Error::Aggregated)?;
        info!(request_id = %ctx.request_id, username = %req.username, "Login revoked");
        Ok(DeleteUserResponse {})
    }

    async fn close(&self) -> Result<()> {
        self.producer.close().await
    }

    fn secret_values(&self) -> SecretValues {
        self.producer.secret_values()
    }
}
