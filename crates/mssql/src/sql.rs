//! SQL used when the operator supplies no statements of their own

/// Default password rotation template.
pub const ALTER_LOGIN_SQL: &str = "ALTER LOGIN [{{username}}] WITH PASSWORD = '{{password}}'";

/// Existence probe for a server login; `@p1` is the login name.
pub const LOGIN_EXISTS_SQL: &str = "SELECT 1 FROM master.sys.server_principals WHERE name = @p1;";

/// Active sessions of a login; `@p1` is the login name.
pub const SESSIONS_SQL: &str = "SELECT session_id FROM sys.dm_exec_sessions WHERE login_name = @p1;";

/// Databases holding a user mapped to a login; `@p1` is the login name.
///
/// Rows are `(login_name, database_name, user_name, alias_name)`, all nullable.
pub const LOGIN_MAPPINGS_SQL: &str = "EXEC master.dbo.sp_msloginmappings @p1;";

/// Column of [`LOGIN_MAPPINGS_SQL`] holding the database name.
pub const MAPPING_DATABASE_COLUMN: usize = 1;

/// `name` as a bracket-delimited identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// `value` as a Unicode string literal.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

pub fn disable_login(username: &str) -> String {
    format!("ALTER LOGIN {} DISABLE;", quote_identifier(username))
}

pub fn kill_session(session_id: i64) -> String {
    format!("KILL {session_id};")
}

/// Drop `username` from `database` if it is still there.
pub fn drop_user(database: &str, username: &str) -> String {
    format!(
        "\nUSE {database}\nIF EXISTS\n  (SELECT name\n   FROM sys.database_principals\n   WHERE name = {name})\nBEGIN\n  DROP USER {user}\nEND\n",
        database = quote_identifier(database),
        name = quote_literal(username),
        user = quote_identifier(username),
    )
}

/// Drop the server login if it still exists.
pub fn drop_login(username: &str) -> String {
    format!(
        "\nIF EXISTS\n  (SELECT name\n   FROM master.sys.server_principals\n   WHERE name = {name})\nBEGIN\n  DROP LOGIN {login}\nEND\n",
        name = quote_literal(username),
        login = quote_identifier(username),
    )
}
