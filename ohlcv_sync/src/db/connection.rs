//! SQLite connection helpers.

use diesel::{Connection, RunQueryDsl, SqliteConnection, sql_query};

use crate::error::{Error, Result};

fn unreachable(database_url: &str, e: impl std::fmt::Display) -> Error {
    Error::Connection {
        message: format!("{database_url}: {e}"),
    }
}

/// Open a SQLite connection and apply connection-wide PRAGMAs.
///
/// `database_url` may be a bare path, a `sqlite:` URL, or `:memory:`.
pub fn connect_sqlite(database_url: &str) -> Result<SqliteConnection> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let mut conn = SqliteConnection::establish(path).map_err(|e| unreachable(database_url, e))?;

    // Better read concurrency; a no-op for in-memory databases
    for pragma in [
        "PRAGMA journal_mode=WAL;",
        "PRAGMA foreign_keys=ON;",
        "PRAGMA busy_timeout=5000;",
    ] {
        sql_query(pragma)
            .execute(&mut conn)
            .map_err(|e| unreachable(database_url, e))?;
    }
    Ok(conn)
}
