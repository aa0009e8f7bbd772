use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

use super::schema::{MIGRATIONS, SCHEMA_VERSION_TABLE};

/// Read `MAX(version)` from `schema_version`; absence of the table itself
/// is version 0, not an error.
fn current_version(conn: &Connection) -> Result<i64> {
    conn.execute(SCHEMA_VERSION_TABLE, [])?;
    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Apply every migration strictly greater than the current version, each in
/// its own transaction. Calling this twice on an up-to-date database is a
/// no-op (property #8).
pub fn apply_migrations(conn: &mut Connection) -> Result<()> {
    let current = current_version(conn)?;
    for (version, description, statements) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        info!(version, description, "applying migration");
        let tx = conn.transaction()?;
        for stmt in *statements {
            tx.execute_batch(stmt)?;
        }
        tx.execute(
            "INSERT INTO schema_version (version, description) VALUES (?1, ?2)",
            rusqlite::params![version, description],
        )?;
        tx.commit()?;
        debug!(version, "migration applied");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applying_twice_is_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migrations(&mut conn).unwrap();
        let before = current_version(&conn).unwrap();
        apply_migrations(&mut conn).unwrap();
        let after = current_version(&conn).unwrap();
        assert_eq!(before, after);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
