//! Username generation for dynamic principals

use chrono::Utc;
use uuid::Uuid;

use crate::database::UsernameMetadata;
use crate::error::{Error, Result};

/// Derives unique usernames from a request's display-name and role-name hints.
///
/// Layout: `v<sep><display><sep><role><sep><random><sep><unix seconds>`, with
/// empty hints skipped and the whole name cut to `max_length` characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameGenerator {
    pub display_name_length: usize,
    pub role_name_length: usize,
    pub max_length: usize,
    pub separator: String,
    pub random_length: usize,
}

impl Default for UsernameGenerator {
    fn default() -> Self {
        Self {
            display_name_length: 20,
            role_name_length: 20,
            max_length: 128,
            separator: "-".into(),
            random_length: 20,
        }
    }
}

impl UsernameGenerator {
    pub fn generate(&self, metadata: &UsernameMetadata) -> Result<String> {
        self.generate_at(metadata, Utc::now().timestamp())
    }

    fn generate_at(&self, metadata: &UsernameMetadata, unix_seconds: i64) -> Result<String> {
        if self.max_length == 0 {
            return Err(Error::invalid_argument(
                "username max length must be greater than zero",
            ));
        }

        let mut parts = vec!["v".to_owned()];
        let display = truncate(&metadata.display_name, self.display_name_length);
        if !display.is_empty() {
            parts.push(display.to_owned());
        }
        let role = truncate(&metadata.role_name, self.role_name_length);
        if !role.is_empty() {
            parts.push(role.to_owned());
        }
        parts.push(random_alphanumeric(self.random_length));
        parts.push(unix_seconds.to_string());

        let username = parts.join(self.separator.as_str());
        Ok(truncate(&username, self.max_length).to_owned())
    }
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &value[..byte_index],
        None => value,
    }
}

fn random_alphanumeric(length: usize) -> String {
    let mut out = String::with_capacity(length);
    while out.len() < length {
        let missing = length - out.len();
        out.extend(Uuid::new_v4().simple().to_string().chars().take(missing));
    }
    out
}
