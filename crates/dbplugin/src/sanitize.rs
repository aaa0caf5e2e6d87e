//! Error redaction
//!
//! [`ErrorSanitizer`] wraps a [`Database`] and rewrites every error it
//! returns with the plugin's current [`SecretValues`]. Secrets are read at
//! error time, so a password configured by a later `initialize` is covered.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

use crate::context::Context;
use crate::database::{
    Database, DeleteUserRequest, DeleteUserResponse, InitializeRequest, InitializeResponse,
    NewUserRequest, NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};
use crate::error::Result;

/// Replacement used for secrets unless a plugin chooses otherwise
pub const REDACTED: &str = "[redacted]";

/// Secret value → replacement text.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretValues {
    values: BTreeMap<String, String>,
}

impl SecretValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret. Empty secrets are ignored; replacing "" would corrupt every string.
    pub fn with(mut self, secret: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.insert(secret, replacement);
        self
    }

    pub fn insert(&mut self, secret: impl Into<String>, replacement: impl Into<String>) {
        let secret = secret.into();
        if !secret.is_empty() {
            self.values.insert(secret, replacement.into());
        }
    }

    /// Secrets that are redacted with [`REDACTED`].
    pub fn redacting<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = Self::new();
        for secret in secrets {
            values.insert(secret, REDACTED);
        }
        values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Merge `other` into `self`; entries in `other` win.
    pub fn extend(&mut self, other: Self) {
        self.values.extend(other.values);
    }

    /// Replace every secret occurring in `text`.
    ///
    /// Longer secrets are replaced first so a secret that contains another
    /// one is not left half-visible.
    pub fn apply(&self, text: &str) -> String {
        let mut ordered: Vec<_> = self.values.iter().collect();
        ordered.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        ordered
            .into_iter()
            .fold(text.to_owned(), |acc, (secret, replacement)| {
                acc.replace(secret.as_str(), replacement)
            })
    }
}

impl fmt::Debug for SecretValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretValues")
            .field("len", &self.values.len())
            .finish()
    }
}

/// Database middleware that redacts secrets from every returned error.
#[derive(Debug)]
pub struct ErrorSanitizer<D> {
    inner: D,
}

impl<D: Database> ErrorSanitizer<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn sanitize<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| e.redact(&self.inner.secret_values()))
    }
}

#[async_trait]
impl<D: Database> Database for ErrorSanitizer<D> {
    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    async fn initialize(
        &self,
        ctx: &Context,
        req: InitializeRequest,
    ) -> Result<InitializeResponse> {
        let result = self.inner.initialize(ctx, req).await;
        self.sanitize(result)
    }

    async fn new_user(&self, ctx: &Context, req: NewUserRequest) -> Result<NewUserResponse> {
        let result = self.inner.new_user(ctx, req).await;
        self.sanitize(result)
    }

    async fn update_user(
        &self,
        ctx: &Context,
        req: UpdateUserRequest,
    ) -> Result<UpdateUserResponse> {
        let result = self.inner.update_user(ctx, req).await;
        self.sanitize(result)
    }

    async fn delete_user(
        &self,
        ctx: &Context,
        req: DeleteUserRequest,
    ) -> Result<DeleteUserResponse> {
        let result = self.inner.delete_user(ctx, req).await;
        self.sanitize(result)
    }

    async fn close(&self) -> Result<()> {
        let result = self.inner.close().await;
        self.sanitize(result)
    }

    fn secret_values(&self) -> SecretValues {
        self.inner.secret_values()
    }
}
