//! Embedded schema migrations.

use diesel::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::{
    db::connection::connect_sqlite,
    error::{Error, Result},
};

/// Embedded Diesel migrations bundled with this crate.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Applies pending migrations on an open connection.
pub fn run_pending(conn: &mut SqliteConnection) -> Result<()> {
    conn.run_pending_migrations(MIGRATIONS)
        .map(|_| ())
        .map_err(|e| Error::Connection {
            message: format!("migrations failed: {e}"),
        })
}

/// Opens `url` and applies pending migrations.
pub fn run_sqlite(url: &str) -> Result<()> {
    let mut conn = connect_sqlite(url)?;
    run_pending(&mut conn)
}
