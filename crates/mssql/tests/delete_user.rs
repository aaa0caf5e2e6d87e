//! Login revocation, with operator statements and with the default cascade

mod common;

use keyline_dbplugin::testing::{Call, MockServer};
use keyline_dbplugin::{
    Context, Database, DeleteUserRequest, EnumerationTarget, Error, Row, SqlValue, Statements,
};
use keyline_mssql::sql;
use pretty_assertions::assert_eq;

use common::{plugin, statements};

const USERNAME: &str = "v-app-readonly";

fn request(statements: Statements) -> DeleteUserRequest {
    DeleteUserRequest {
        username: USERNAME.into(),
        statements,
    }
}

fn session(id: i64) -> Row {
    Row::new(vec![SqlValue::Int(id)])
}

fn mapping(database: Option<&str>) -> Row {
    Row::new(vec![
        USERNAME.into(),
        database.into(),
        database.map(|_| USERNAME).into(),
        SqlValue::Null,
    ])
}

/// One active session and a user in `sales`.
fn seeded_server() -> std::sync::Arc<MockServer> {
    let server = MockServer::new();
    server.respond("dm_exec_sessions", vec![session(61)]);
    server.respond(
        "sp_msloginmappings",
        vec![mapping(Some("sales")), mapping(None)],
    );
    server
}

#[tokio::test]
async fn test_operator_statements_run_best_effort() {
    // GIVEN: the first of two revocation statements fails
    let server = MockServer::new();
    server.fail_statement("DROP USER", "Cannot drop the user, because it does not exist");
    let plugin = plugin(&server).await;

    // WHEN: the login is revoked with operator statements
    let err = plugin
        .delete_user(
            &Context::new(),
            request(statements(&["DROP USER [{{name}}]; DROP LOGIN [{{name}}];"])),
        )
        .await
        .unwrap_err();

    // THEN: the second still took effect and the failure names the first
    assert_eq!(server.committed(), vec![format!("DROP LOGIN [{USERNAME}]")]);
    assert_eq!(server.count(|c| matches!(c, Call::Begin { .. })), 0);
    match err {
        Error::Aggregated(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures.errors()[0].statement, format!("DROP USER [{USERNAME}]"));
        }
        other => panic!("expected aggregated error, got {other}"),
    }
}

#[tokio::test]
async fn test_operator_statements_succeed() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    plugin
        .delete_user(
            &Context::new(),
            request(statements(&["DROP LOGIN [{{name}}]"])),
        )
        .await
        .unwrap();

    assert_eq!(server.committed(), vec![format!("DROP LOGIN [{USERNAME}]")]);
    assert!(server.queries().is_empty());
}

#[tokio::test]
async fn test_default_cascade_runs_in_order() {
    let server = seeded_server();
    let plugin = plugin(&server).await;

    plugin
        .delete_user(&Context::new(), request(Statements::default()))
        .await
        .unwrap();

    assert_eq!(
        server.executed(),
        vec![
            sql::disable_login(USERNAME),
            sql::kill_session(61),
            sql::drop_user("sales", USERNAME),
            sql::drop_login(USERNAME),
        ]
    );
    assert_eq!(
        server.queries(),
        vec![sql::SESSIONS_SQL.to_string(), sql::LOGIN_MAPPINGS_SQL.to_string()]
    );
    assert!(server.calls().contains(&Call::Query {
        statement: sql::SESSIONS_SQL.into(),
        params: vec![SqlValue::from(USERNAME)],
    }));
}

#[tokio::test]
async fn test_blank_statements_select_default_cascade() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    plugin
        .delete_user(&Context::new(), request(statements(&[" ; "])))
        .await
        .unwrap();

    assert_eq!(
        server.executed(),
        vec![sql::disable_login(USERNAME), sql::drop_login(USERNAME)]
    );
}

#[tokio::test]
async fn test_failed_kill_keeps_login() {
    // GIVEN: the session cannot be killed
    let server = seeded_server();
    server.fail_statement("KILL", "Only user processes can be killed");
    let plugin = plugin(&server).await;

    // WHEN: the default cascade runs
    let err = plugin
        .delete_user(&Context::new(), request(Statements::default()))
        .await
        .unwrap_err();

    // THEN: the user is still dropped, the login is not
    let executed = server.executed();
    assert!(executed.contains(&sql::drop_user("sales", USERNAME)));
    assert!(!executed.contains(&sql::drop_login(USERNAME)));
    match err {
        Error::Cleanup(failures) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures.errors()[0].statement, sql::kill_session(61));
        }
        other => panic!("expected cleanup error, got {other}"),
    }
}

#[tokio::test]
async fn test_session_enumeration_failure_stops_cascade() {
    let server = MockServer::new();
    server.fail_query("dm_exec_sessions", "VIEW SERVER STATE permission denied");
    let plugin = plugin(&server).await;

    let err = plugin
        .delete_user(&Context::new(), request(Statements::default()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Enumeration {
            target: EnumerationTarget::Sessions,
            ..
        }
    ));
    assert_eq!(server.executed(), vec![sql::disable_login(USERNAME)]);
}

#[tokio::test]
async fn test_mapping_enumeration_failure_still_kills_sessions() {
    // GIVEN: sessions are listed but the mapping procedure fails
    let server = MockServer::new();
    server.respond("dm_exec_sessions", vec![session(61), session(62)]);
    server.fail_query("sp_msloginmappings", "Could not find stored procedure");
    let plugin = plugin(&server).await;

    let err = plugin
        .delete_user(&Context::new(), request(Statements::default()))
        .await
        .unwrap_err();

    // THEN: sessions are gone, login remains disabled
    assert!(matches!(
        err,
        Error::Enumeration {
            target: EnumerationTarget::LoginMappings,
            ..
        }
    ));
    assert_eq!(
        server.executed(),
        vec![
            sql::disable_login(USERNAME),
            sql::kill_session(61),
            sql::kill_session(62),
        ]
    );
}

#[tokio::test]
async fn test_mapping_failure_reports_failed_kills() {
    // GIVEN: mappings cannot be listed and the only session cannot be killed
    let server = MockServer::new();
    server.respond("dm_exec_sessions", vec![session(61)]);
    server.fail_query("sp_msloginmappings", "Could not find stored procedure");
    server.fail_statement("KILL", "Only user processes can be killed");
    let plugin = plugin(&server).await;

    // WHEN: the default cascade runs
    let err = plugin
        .delete_user(&Context::new(), request(Statements::default()))
        .await
        .unwrap_err();

    // THEN: the error names both the enumeration and the failed kill
    let message = err.to_string();
    assert!(message.contains("Could not find stored procedure"), "{message}");
    assert!(message.contains(&sql::kill_session(61)), "{message}");
    match err {
        Error::Enumeration {
            target: EnumerationTarget::LoginMappings,
            cleanup,
            ..
        } => {
            assert_eq!(cleanup.len(), 1);
            assert_eq!(cleanup.errors()[0].statement, sql::kill_session(61));
        }
        other => panic!("expected mapping enumeration error, got {other}"),
    }
    assert!(!server.executed().contains(&sql::drop_login(USERNAME)));
}

#[tokio::test]
async fn test_disable_failure_stops_cascade() {
    let server = seeded_server();
    server.fail_statement("DISABLE", "Cannot alter the login, it does not exist");
    let plugin = plugin(&server).await;

    let err = plugin
        .delete_user(&Context::new(), request(Statements::default()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Execution(_)));
    assert!(server.queries().is_empty());
}

#[tokio::test]
async fn test_empty_username_is_rejected() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    let err = plugin
        .delete_user(
            &Context::new(),
            DeleteUserRequest {
                username: String::new(),
                statements: Statements::default(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidArgument(_)));
    assert!(server.calls().is_empty());
}

#[tokio::test]
async fn test_identifiers_are_quoted() {
    let server = MockServer::new();
    let plugin = plugin(&server).await;

    plugin
        .delete_user(
            &Context::new(),
            DeleteUserRequest {
                username: "v-o'neil]x".into(),
                statements: Statements::default(),
            },
        )
        .await
        .unwrap();

    let executed = server.executed();
    assert_eq!(executed[0], "ALTER LOGIN [v-o'neil]]x] DISABLE;");
    assert!(executed[1].contains("WHERE name = N'v-o''neil]x'"));
    assert!(executed[1].contains("DROP LOGIN [v-o'neil]]x]"));
}
