//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//! - Provide `init_db` for context-driven bootstrap (drop + seed variants).
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.
//! - `drop_existing` must never run against a production file database
//!   outside test-mode bootstrap.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Canonical U-space zone restriction reasons seeded as reference data.
const SEED_REASONS: &[(&str, &str)] = &[
    ("AIR_TRAFFIC", "Conflicting manned air traffic"),
    ("SENSITIVE", "Sensitive or strategic site"),
    ("PRIVACY", "Privacy protection area"),
    ("POPULATION", "Population density constraint"),
    ("NATURE", "Nature or environmental protection"),
    ("NOISE", "Noise abatement area"),
    ("EMERGENCY", "Emergency operations area"),
    ("OTHER", "Other restriction"),
];

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with_mode("file", || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with_mode("memory", Connection::open_in_memory)
}

/// Bootstraps the schema on an already-opened connection.
///
/// # Contract
/// - `drop_existing`: drops every application table first (test-mode reset).
/// - `load_initial_data`: seeds reference data (zone reasons) idempotently.
/// - Migrations always run; the call is safe on an already-migrated database.
pub fn init_db(conn: &mut Connection, drop_existing: bool, load_initial_data: bool) -> DbResult<()> {
    let started_at = Instant::now();
    info!(
        "event=init_db module=db status=start drop_existing={drop_existing} load_initial_data={load_initial_data}"
    );

    let result = (|| -> DbResult<()> {
        if drop_existing {
            drop_all_tables(conn)?;
        }
        apply_migrations(conn)?;
        if load_initial_data {
            seed_reference_data(conn)?;
        }
        Ok(())
    })();

    match &result {
        Ok(()) => info!(
            "event=init_db module=db status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=init_db module=db status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }

    result
}

fn open_with_mode(
    mode: &str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)?;
    Ok(())
}

/// Drops every application table so migrations recreate a clean schema.
///
/// Foreign keys are disabled for the duration of the drop so the tables can
/// be removed without dependency ordering.
fn drop_all_tables(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = OFF;")?;

    let tables: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%';",
        )?;
        let mut rows = stmt.query([])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            names.push(row.get::<_, String>(0)?);
        }
        names
    };

    for table in &tables {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;
    }
    conn.execute_batch("PRAGMA user_version = 0;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    info!(
        "event=db_drop module=db status=ok dropped_tables={}",
        tables.len()
    );
    Ok(())
}

/// Seeds global reference data. Re-running is a no-op per row.
fn seed_reference_data(conn: &Connection) -> DbResult<()> {
    let mut inserted = 0usize;
    for (name, description) in SEED_REASONS {
        inserted += conn.execute(
            "INSERT OR IGNORE INTO reasons (name, description) VALUES (?1, ?2);",
            rusqlite::params![name, description],
        )?;
    }
    info!("event=db_seed module=db status=ok inserted_reasons={inserted}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{init_db, open_db_in_memory};

    #[test]
    fn init_db_seed_is_idempotent() {
        let mut conn = open_db_in_memory().unwrap();
        init_db(&mut conn, false, true).unwrap();
        let first: i64 = conn
            .query_row("SELECT COUNT(*) FROM reasons;", [], |row| row.get(0))
            .unwrap();
        assert!(first > 0);

        init_db(&mut conn, false, true).unwrap();
        let second: i64 = conn
            .query_row("SELECT COUNT(*) FROM reasons;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn init_db_drop_existing_resets_data() {
        let mut conn = open_db_in_memory().unwrap();
        conn.execute(
            "INSERT INTO environments (name, modified_by) VALUES ('uat', 'tester');",
            [],
        )
        .unwrap();

        init_db(&mut conn, true, false).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM environments;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
