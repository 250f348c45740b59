use anyhow::Context;
use rusqlite::Connection;

/// Applied in order; names are recorded in `_migrations` so each runs once.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_records.sql",
        include_str!("../../migrations/001_records.sql"),
    ),
    (
        "002_booking_indexes.sql",
        include_str!("../../migrations/002_booking_indexes.sql"),
    ),
    (
        "003_canonical_status.sql",
        include_str!("../../migrations/003_canonical_status.sql"),
    ),
];

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("failed to create migrations table")?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .context("failed to check migration status")?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("failed to apply migration: {name}"))?;

        conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])
            .with_context(|| format!("failed to record migration: {name}"))?;

        tracing::info!("applied migration: {name}");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_legacy_status_is_rewritten() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO records (collection, id, body) VALUES ('bookings', 'b1', ?1)",
            [r#"{"id":"b1","status":"confirmed"}"#],
        )
        .unwrap();
        conn.execute(
            "DELETE FROM _migrations WHERE name = '003_canonical_status.sql'",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();

        let status: String = conn
            .query_row(
                "SELECT json_extract(body, '$.status') FROM records WHERE id = 'b1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(status, "accepted");
    }
}
