use identity_core::db::migrations::latest_version;
use identity_core::db::{open_db, open_db_in_memory, DbError, DbStage};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "contacts");
    assert_index_exists(&conn, "idx_contacts_email_live");
    assert_index_exists(&conn, "idx_contacts_phone_number_live");
    assert_index_exists(&conn, "idx_contacts_linked_id_live");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    conn_first
        .execute(
            "INSERT INTO contacts (email, link_precedence) VALUES ('doc@hillvalley.edu', 'primary');",
            [],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let rows: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM contacts;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failed_migration_names_its_step_and_keeps_old_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");

    // A pre-versioning table without `deleted_at` breaks the live-row indexes.
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE contacts (
            id INTEGER PRIMARY KEY,
            email TEXT,
            phone_number TEXT
        );",
    )
    .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert_eq!(
        err.stage(),
        Some(DbStage::Migrate {
            version: 2,
            name: "contact_lookup_indexes",
        })
    );
    assert_eq!(err.code(), "db_migrate_failed");

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 0);
}

#[test]
fn schema_rejects_rows_breaking_link_rules() {
    let conn = open_db_in_memory().unwrap();

    let no_fields = conn.execute(
        "INSERT INTO contacts (link_precedence) VALUES ('primary');",
        [],
    );
    assert!(no_fields.is_err());

    let unlinked_secondary = conn.execute(
        "INSERT INTO contacts (email, link_precedence) VALUES ('marty@hillvalley.edu', 'secondary');",
        [],
    );
    assert!(unlinked_secondary.is_err());

    let bad_precedence = conn.execute(
        "INSERT INTO contacts (email, link_precedence) VALUES ('marty@hillvalley.edu', 'tertiary');",
        [],
    );
    assert!(bad_precedence.is_err());

    let missing_primary = conn.execute(
        "INSERT INTO contacts (email, linked_id, link_precedence)
         VALUES ('marty@hillvalley.edu', 42, 'secondary');",
        [],
    );
    assert!(missing_primary.is_err());
}

#[test]
fn default_timestamps_are_epoch_milliseconds() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO contacts (phone_number, link_precedence) VALUES ('123456', 'primary');",
        [],
    )
    .unwrap();

    let (created_at, updated_at): (i64, i64) = conn
        .query_row(
            "SELECT created_at, updated_at FROM contacts WHERE phone_number = '123456';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    // 2020-01-01T00:00:00Z in epoch milliseconds.
    assert!(created_at > 1_577_836_800_000);
    assert!(updated_at >= created_at);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    assert_schema_object(conn, "table", table_name);
}

fn assert_index_exists(conn: &Connection, index_name: &str) {
    assert_schema_object(conn, "index", index_name);
}

fn assert_schema_object(conn: &Connection, kind: &str, name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            );",
            [kind, name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "{kind} {name} does not exist");
}
