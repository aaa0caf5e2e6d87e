//! Statement templates
//!
//! A statement template is a block of SQL separated by `;`, where each
//! statement may reference the placeholders `{{name}}`, `{{username}}`,
//! `{{password}}` and `{{expiration}}`. Expansion splits the block, drops
//! empty fragments and substitutes the placeholders it was given. Any other
//! `{{token}}` is left untouched; whether that is an error is up to the
//! database that receives the statement.
//!
//! ```
//! use keyline_dbplugin::template::{Placeholder, Placeholders};
//!
//! let placeholders = Placeholders::new().with(Placeholder::Name, "v-app-svc");
//! let statements = placeholders.expand("CREATE LOGIN [{{name}}];\n;  GRANT CONNECT TO [{{name}}];");
//! assert_eq!(
//!     statements,
//!     ["CREATE LOGIN [v-app-svc]", "GRANT CONNECT TO [v-app-svc]"]
//! );
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// Statement separator inside a template block
pub const STATEMENT_SEPARATOR: char = ';';

/// The closed set of placeholders a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Placeholder {
    Name,
    Username,
    Password,
    Expiration,
}

impl Placeholder {
    pub const ALL: [Self; 4] = [Self::Name, Self::Username, Self::Password, Self::Expiration];

    /// Key as it appears between the braces.
    pub fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Username => "username",
            Self::Password => "password",
            Self::Expiration => "expiration",
        }
    }

    /// Full token, e.g. `{{name}}`.
    pub fn token(self) -> &'static str {
        match self {
            Self::Name => "{{name}}",
            Self::Username => "{{username}}",
            Self::Password => "{{password}}",
            Self::Expiration => "{{expiration}}",
        }
    }

    /// Look up a placeholder by key. Keys are case-sensitive.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Values to substitute into a template.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Placeholders {
    values: BTreeMap<Placeholder, String>,
}

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `placeholder` to `value`, replacing an earlier binding.
    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.values.insert(placeholder, value.into());
        self
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.values.get(&placeholder).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every bound placeholder token in `statement`.
    ///
    /// Single pass: substituted values are never scanned again, so a password
    /// that happens to contain `{{name}}` is inserted verbatim.
    pub fn substitute(&self, statement: &str) -> String {
        let mut out = String::with_capacity(statement.len());
        let mut rest = statement;
        while let Some(open) = rest.find("{{") {
            let (before, candidate) = rest.split_at(open);
            out.push_str(before);
            let Some(close) = candidate.find("}}") else {
                out.push_str(candidate);
                return out;
            };
            let key = &candidate[2..close];
            match Placeholder::from_key(key).and_then(|p| self.get(p)) {
                Some(value) => {
                    out.push_str(value);
                    rest = &candidate[close + 2..];
                }
                None => {
                    // Keep the braces and rescan after them so `{{{{name}}` still expands.
                    out.push_str("{{");
                    rest = &candidate[2..];
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Split `block` into statements and substitute each one.
    pub fn expand(&self, block: &str) -> Vec<String> {
        split_statements(block)
            .map(|statement| self.substitute(statement))
            .collect()
    }

    /// Expand several blocks, keeping block order and statement order.
    pub fn expand_all<S: AsRef<str>>(&self, blocks: &[S]) -> Vec<String> {
        blocks
            .iter()
            .flat_map(|block| self.expand(block.as_ref()))
            .collect()
    }
}

// Values may be passwords.
impl fmt::Debug for Placeholders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Split a block on `;`, trimming each fragment and skipping empty ones.
pub fn split_statements(block: &str) -> impl Iterator<Item = &str> {
    block
        .split(STATEMENT_SEPARATOR)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
}

/// True when `blocks` contain no statement at all once split.
pub fn is_blank<S: AsRef<str>>(blocks: &[S]) -> bool {
    blocks
        .iter()
        .all(|block| split_statements(block.as_ref()).next().is_none())
}
