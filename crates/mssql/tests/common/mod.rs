//! Shared helpers for keyline-mssql integration tests
#![allow(dead_code)]

use std::sync::Arc;

use keyline_dbplugin::testing::MockServer;
use keyline_dbplugin::{
    Context, Database, ErrorSanitizer, InitializeRequest, Statements, UsernameMetadata,
};
use keyline_mssql::{LockPolicy, MsSql};
use serde_json::json;

pub const ADMIN_PASSWORD: &str = "Adm1n!";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn config() -> serde_json::Value {
    json!({
        "connection_url": "sqlserver://{{username}}:{{password}}@db:1433",
        "username": "sa",
        "password": ADMIN_PASSWORD,
    })
}

/// Plugin initialized against `server` without verifying the connection.
pub async fn plugin(server: &Arc<MockServer>) -> ErrorSanitizer<MsSql> {
    plugin_with_policy(server, LockPolicy::default()).await
}

pub async fn plugin_with_policy(
    server: &Arc<MockServer>,
    policy: LockPolicy,
) -> ErrorSanitizer<MsSql> {
    init_tracing();
    let plugin = ErrorSanitizer::new(MsSql::new(server.connector()).with_lock_policy(policy));
    plugin
        .initialize(
            &Context::new(),
            InitializeRequest {
                config: config(),
                verify_connection: false,
            },
        )
        .await
        .expect("initialize");
    plugin
}

pub fn statements(blocks: &[&str]) -> Statements {
    Statements::new(blocks.iter().copied())
}

pub fn metadata(display_name: &str, role_name: &str) -> UsernameMetadata {
    UsernameMetadata {
        display_name: display_name.into(),
        role_name: role_name.into(),
    }
}
