//! Login creation

mod common;

use chrono::{TimeZone, Utc};
use keyline_dbplugin::testing::{Call, MockServer};
use keyline_dbplugin::{Context, Database, Error, NewUserRequest, REDACTED, Statements};
use pretty_assertions::assert_eq;
use rstest::rstest;
use secrecy::SecretString;

use common::{metadata, plugin, statements};

const PASSWORD: &str = "s3cr3t-Pa55";

const CREATE_SQL: &str = "CREATE LOGIN [{{name}}] WITH PASSWORD = '{{password}}';\n\
    CREATE USER [{{name}}] FOR LOGIN [{{name}}];";

fn request(statements: Statements) -> NewUserRequest {
    NewUserRequest {
        username_config: metadata("token", "readonly"),
        statements,
        password: SecretString::from(PASSWORD.to_owned()),
        expiration: Utc.with_ymd_and_hms(2026, 10, 16, 12, 30, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_creates_login_and_user_in_one_transaction() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    let response = plugin
        .new_user(&Context::new(), request(statements(&[CREATE_SQL])))
        .await
        .unwrap();

    let username = response.username;
    assert!(username.starts_with("v-token-readonly-"), "{username}");
    assert!(username.len() <= 128);

    let login = format!("CREATE LOGIN [{username}] WITH PASSWORD = '{PASSWORD}'");
    let user = format!("CREATE USER [{username}] FOR LOGIN [{username}]");
    assert_eq!(
        server.calls(),
        vec![
            Call::Connect,
            Call::Begin { tx: 1 },
            Call::Execute { tx: Some(1), statement: login.clone() },
            Call::Execute { tx: Some(1), statement: user.clone() },
            Call::Commit { tx: 1 },
        ]
    );
    assert_eq!(server.committed(), vec![login, user]);
}

#[tokio::test]
async fn test_usernames_are_unique() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;
    let ctx = Context::new();

    let a = plugin
        .new_user(&ctx, request(statements(&[CREATE_SQL])))
        .await
        .unwrap();
    let b = plugin
        .new_user(&ctx, request(statements(&[CREATE_SQL])))
        .await
        .unwrap();

    assert_ne!(a.username, b.username);
}

#[tokio::test]
async fn test_expiration_placeholder_is_formatted() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    plugin
        .new_user(
            &Context::new(),
            request(statements(&["EXEC audit.record '{{expiration}}'"])),
        )
        .await
        .unwrap();

    assert_eq!(
        server.committed(),
        vec!["EXEC audit.record '2026-10-16 12:30:00+0000'".to_string()]
    );
}

#[rstest]
#[case::no_blocks(&[])]
#[case::only_separators(&[" ; ;\n"])]
#[case::empty_blocks(&["", "   "])]
#[tokio::test]
async fn test_blank_statements_touch_nothing(#[case] blocks: &[&str]) {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    let err = plugin
        .new_user(&Context::new(), request(statements(blocks)))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::EmptyStatement));
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn test_failure_rolls_back_whole_batch() {
    // GIVEN: the third of three statements fails
    let server = MockServer::new();
    server.fail_statement("GRANT", "Cannot find the object 'reports'");
    let plugin = plugin(&server).await;

    // WHEN: the login is created
    let err = plugin
        .new_user(
            &Context::new(),
            request(statements(&[
                CREATE_SQL,
                "GRANT SELECT ON reports TO [{{name}}];",
            ])),
        )
        .await
        .unwrap_err();

    // THEN: the earlier statements ran but nothing was committed
    assert!(matches!(err, Error::Execution(_)));
    assert_eq!(server.executed().len(), 3);
    assert!(server.committed().is_empty());
    assert!(server.calls().contains(&Call::Rollback { tx: 1 }));
}

#[tokio::test]
async fn test_error_does_not_leak_password() {
    // GIVEN: the driver echoes the failing statement back
    let server = MockServer::new();
    server.fail_statement(
        "CREATE LOGIN",
        format!("Password validation failed for '{PASSWORD}'"),
    );
    let plugin = plugin(&server).await;

    let err = plugin
        .new_user(&Context::new(), request(statements(&[CREATE_SQL])))
        .await
        .unwrap_err();

    // THEN: neither the statement nor the driver message shows it
    let message = err.to_string();
    assert!(!message.contains(PASSWORD), "{message}");
    assert!(message.contains(REDACTED), "{message}");
    match err {
        Error::Execution(e) => assert!(!e.source.message.contains(PASSWORD)),
        other => panic!("expected execution error, got {other}"),
    }
}

#[tokio::test]
async fn test_create_before_initialize_fails() {
    let server = MockServer::new();
    let plugin = keyline_mssql::new(server.connector());

    let err = plugin
        .new_user(&Context::new(), request(statements(&[CREATE_SQL])))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotInitialized));
}
