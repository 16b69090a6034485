//! Versioned `contacts` schema.
//!
//! Versions are mirrored to `PRAGMA user_version`. All pending steps run in
//! one transaction, so a failed step leaves the database at its old version.

use crate::db::{DbError, DbResult, DbStage};
use log::{debug, info};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

impl Migration {
    fn stage(&self) -> DbStage {
        DbStage::Migrate {
            version: self.version,
            name: self.name,
        }
    }
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "contacts",
        sql: include_str!("0001_contacts.sql"),
    },
    Migration {
        version: 2,
        name: "contact_lookup_indexes",
        sql: include_str!("0002_contact_lookup_indexes.sql"),
    },
];

/// Schema version this binary migrates to.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings `conn` up to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is ahead of this binary.
/// - `Sqlite` tagged with the failing step; nothing is applied in that case.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))
        .map_err(|err| DbError::sqlite(DbStage::ReadSchemaVersion, err))?;
    let latest = latest_version();

    if from_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: latest,
        });
    }
    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from_version)
        .collect();
    if pending.is_empty() {
        debug!("event=db_migrate module=db status=skipped version={from_version}");
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|err| DbError::sqlite(DbStage::MigrationTransaction, err))?;
    for migration in pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| {
                tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
            })
            .map_err(|err| DbError::sqlite(migration.stage(), err))?;
        debug!(
            "event=db_migrate_step module=db status=applied version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()
        .map_err(|err| DbError::sqlite(DbStage::MigrationTransaction, err))?;

    info!("event=db_migrate module=db status=ok from_version={from_version} to_version={latest}");
    Ok(())
}
