pub mod migrations;
pub mod queries;

use std::time::Duration;

use anyhow::Context;
use rusqlite::Connection;

/// Opens a connection with the pragmas every caller needs, without touching the schema.
pub fn open_connection(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;
    conn.busy_timeout(Duration::from_secs(5))
        .context("failed to set busy timeout")?;

    Ok(conn)
}

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = open_connection(path)?;

    migrations::run_migrations(&conn)?;

    Ok(conn)
}
