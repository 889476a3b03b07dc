//! Schema versioning.
//!
//! The applied version lives in SQLite's `user_version` header field. Each
//! pending migration runs in its own transaction together with the version
//! bump, so a failed migration leaves the previous version in place.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Ordered migrations; version `n` is `MIGRATIONS[n - 1]`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("initial", include_str!("migrations/001_initial.sql")),
    ("class_schedules", include_str!("migrations/002_class_schedules.sql")),
    ("schedule_windows", include_str!("migrations/003_schedule_windows.sql")),
    ("equipment_requests", include_str!("migrations/004_equipment_requests.sql")),
    ("academic_terms", include_str!("migrations/005_academic_terms.sql")),
];

pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut version = current_version(conn)?;

    // Files created before versioning carry the initial tables at version 0
    if version == 0 && table_exists(conn, "laboratory_reservations")? {
        set_version(conn, 1)?;
        version = 1;
        tracing::info!("Existing database without a schema version, treating it as version 1");
    }

    if version > latest_version() {
        anyhow::bail!(
            "Database schema version {} is newer than this build supports ({})",
            version,
            latest_version()
        );
    }

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate().skip(version as usize) {
        let target = index as u32 + 1;
        tracing::info!(version = target, name, "Applying migration");

        let tx = conn
            .unchecked_transaction()
            .context("Failed to begin migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration {target:03}_{name}"))?;
        set_version(&tx, target)?;
        tx.commit()
            .with_context(|| format!("Failed to commit migration {target:03}_{name}"))?;
    }

    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("Failed to read schema version")
}

fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.pragma_update(None, "user_version", version)
        .context("Failed to record schema version")
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
