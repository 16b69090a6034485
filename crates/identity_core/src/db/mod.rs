//! Contact database bootstrap.
//!
//! Opening a connection and migrating the `contacts` schema are one step:
//! callers never see a connection whose schema is behind this binary.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Bootstrap step that was running when SQLite failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbStage {
    Connect,
    Configure,
    ReadSchemaVersion,
    Migrate { version: u32, name: &'static str },
    MigrationTransaction,
}

impl Display for DbStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => f.write_str("connect"),
            Self::Configure => f.write_str("configure"),
            Self::ReadSchemaVersion => f.write_str("schema version read"),
            Self::Migrate { version, name } => write!(f, "migration {version:04} ({name})"),
            Self::MigrationTransaction => f.write_str("migration transaction"),
        }
    }
}

/// Contact database could not be made ready.
#[derive(Debug)]
pub enum DbError {
    Sqlite {
        stage: DbStage,
        source: rusqlite::Error,
    },
    /// Database was migrated by a newer binary.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    pub(crate) fn sqlite(stage: DbStage, source: rusqlite::Error) -> Self {
        Self::Sqlite { stage, source }
    }

    pub fn stage(&self) -> Option<DbStage> {
        match self {
            Self::Sqlite { stage, .. } => Some(*stage),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }

    /// Short machine-readable code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite {
                stage: DbStage::Connect,
                ..
            } => "db_open_failed",
            Self::Sqlite {
                stage: DbStage::Migrate { .. } | DbStage::MigrationTransaction,
                ..
            } => "db_migrate_failed",
            Self::Sqlite { .. } => "db_bootstrap_failed",
            Self::UnsupportedSchemaVersion { .. } => "db_schema_too_new",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite { stage, source } => {
                write!(f, "contact database {stage} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "contact database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DbError, DbStage};

    #[test]
    fn migration_failures_name_the_migration() {
        let err = DbError::sqlite(
            DbStage::Migrate {
                version: 2,
                name: "contact_lookup_indexes",
            },
            rusqlite::Error::InvalidQuery,
        );
        assert_eq!(err.code(), "db_migrate_failed");
        assert!(err
            .to_string()
            .starts_with("contact database migration 0002 (contact_lookup_indexes) failed"));
    }
}
