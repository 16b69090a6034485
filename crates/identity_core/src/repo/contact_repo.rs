//! Contact store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide match, lookup, insert, demote and relink primitives over
//!   `contacts` storage.
//! - Provide the write scope that serializes one identify call against all
//!   others sharing the database.
//!
//! # Invariants
//! - Soft-deleted rows are invisible to every operation.
//! - Multi-row reads are ordered by `created_at ASC, id ASC`.
//! - Mutations refresh `updated_at` and never touch `created_at`.

use crate::model::contact::{
    Contact, ContactId, ContactValidationError, LinkPrecedence, NewContact,
};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

const CONTACT_SELECT_SQL: &str = "SELECT
    id,
    phone_number,
    email,
    linked_id,
    link_precedence,
    created_at,
    updated_at,
    deleted_at
FROM contacts";

const NOW_EPOCH_MS_SQL: &str = "CAST((julianday('now') - 2440587.5) * 86400000.0 AS INTEGER)";

pub type StoreResult<T> = Result<T, StoreError>;

/// Gateway primitive that produced a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    FindByEmailOrPhone,
    FindById,
    FindSecondariesOf,
    Insert,
    DemoteToSecondary,
    RelinkSecondaries,
    BeginWriteScope,
    CommitWriteScope,
}

impl StoreOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FindByEmailOrPhone => "find_by_email_or_phone",
            Self::FindById => "find_by_id",
            Self::FindSecondariesOf => "find_secondaries_of",
            Self::Insert => "insert",
            Self::DemoteToSecondary => "demote_to_secondary",
            Self::RelinkSecondaries => "relink_secondaries",
            Self::BeginWriteScope => "begin_write_scope",
            Self::CommitWriteScope => "commit_write_scope",
        }
    }
}

impl Display for StoreOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact store failure. Non-retriable for the current identify call.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite rejected the statement.
    Db {
        operation: StoreOperation,
        contact_id: Option<ContactId>,
        source: rusqlite::Error,
    },
    /// Operation called with arguments the contract forbids.
    InvalidQuery {
        operation: StoreOperation,
        reason: &'static str,
    },
    /// Mutation target does not exist or is soft-deleted.
    NotFound {
        operation: StoreOperation,
        contact_id: ContactId,
    },
    /// Persisted row violates contact invariants.
    InvalidData(ContactValidationError),
}

impl StoreError {
    fn db(operation: StoreOperation, contact_id: Option<ContactId>, err: rusqlite::Error) -> Self {
        Self::Db {
            operation,
            contact_id,
            source: err,
        }
    }

    /// Operation that failed, when the error is tied to one.
    pub fn operation(&self) -> Option<StoreOperation> {
        match self {
            Self::Db { operation, .. }
            | Self::InvalidQuery { operation, .. }
            | Self::NotFound { operation, .. } => Some(*operation),
            Self::InvalidData(_) => None,
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db {
                operation,
                contact_id: Some(id),
                source,
            } => write!(f, "contact store {operation} failed for contact {id}: {source}"),
            Self::Db {
                operation,
                contact_id: None,
                source,
            } => write!(f, "contact store {operation} failed: {source}"),
            Self::InvalidQuery { operation, reason } => {
                write!(f, "invalid contact store {operation} call: {reason}")
            }
            Self::NotFound {
                operation,
                contact_id,
            } => write!(f, "contact store {operation}: contact {contact_id} not found"),
            Self::InvalidData(err) => write!(f, "invalid persisted contact data: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db { source, .. } => Some(source),
            Self::InvalidData(err) => Some(err),
            Self::InvalidQuery { .. } => None,
            Self::NotFound { .. } => None,
        }
    }
}

impl From<ContactValidationError> for StoreError {
    fn from(value: ContactValidationError) -> Self {
        Self::InvalidData(value)
    }
}

/// Gateway over contact records consumed by the identity resolver.
///
/// Every read excludes soft-deleted contacts.
pub trait ContactStore {
    /// Contacts whose email equals `email` OR whose phone equals `phone_number`.
    ///
    /// A `None` argument drops its clause; both `None` is an invalid call.
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>>;
    /// Point lookup.
    fn find_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>>;
    /// All contacts whose `linked_id` equals `primary_id`.
    fn find_secondaries_of(&self, primary_id: ContactId) -> StoreResult<Vec<Contact>>;
    /// Inserts a new row and returns it with store-assigned id and timestamps.
    fn insert(&self, contact: &NewContact) -> StoreResult<Contact>;
    /// Turns `id` into a secondary of `new_primary_id`.
    fn demote_to_secondary(&self, id: ContactId, new_primary_id: ContactId) -> StoreResult<()>;
    /// Points every contact linked to `old_primary_id` at `new_primary_id`.
    ///
    /// Returns the number of relinked contacts.
    fn relink_secondaries(
        &self,
        old_primary_id: ContactId,
        new_primary_id: ContactId,
    ) -> StoreResult<usize>;
    /// Runs `work` with exclusive write access; all of its mutations commit
    /// together or not at all.
    fn with_write_scope<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>;
}

/// SQLite-backed contact store.
///
/// One connection serves one caller at a time; concurrent callers open their
/// own connection to the same database file.
pub struct SqliteContactStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContactStore<'conn> {
    /// Creates a store over a migrated connection (see `db::open_db`).
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_contacts(
        &self,
        operation: StoreOperation,
        contact_id: Option<ContactId>,
        sql: &str,
        bind_values: Vec<Value>,
    ) -> StoreResult<Vec<Contact>> {
        let contacts = collect_contacts(self.conn, sql, bind_values)
            .map_err(|err| StoreError::db(operation, contact_id, err))?;
        for contact in &contacts {
            contact.validate()?;
        }
        Ok(contacts)
    }
}

impl ContactStore for SqliteContactStore<'_> {
    fn find_by_email_or_phone(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> StoreResult<Vec<Contact>> {
        let mut clauses = Vec::new();
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(email) = email {
            clauses.push("email = ?");
            bind_values.push(Value::Text(email.to_string()));
        }
        if let Some(phone_number) = phone_number {
            clauses.push("phone_number = ?");
            bind_values.push(Value::Text(phone_number.to_string()));
        }
        if clauses.is_empty() {
            return Err(StoreError::InvalidQuery {
                operation: StoreOperation::FindByEmailOrPhone,
                reason: "email and phone number are both absent",
            });
        }

        let sql = format!(
            "{CONTACT_SELECT_SQL}
             WHERE deleted_at IS NULL
               AND ({})
             ORDER BY created_at ASC, id ASC;",
            clauses.join(" OR ")
        );
        self.query_contacts(StoreOperation::FindByEmailOrPhone, None, &sql, bind_values)
    }

    fn find_by_id(&self, id: ContactId) -> StoreResult<Option<Contact>> {
        let contact = self
            .conn
            .query_row(
                &format!(
                    "{CONTACT_SELECT_SQL}
                     WHERE id = ?1
                       AND deleted_at IS NULL;"
                ),
                [id],
                parse_contact_row,
            )
            .optional()
            .map_err(|err| StoreError::db(StoreOperation::FindById, Some(id), err))?;

        if let Some(contact) = &contact {
            contact.validate()?;
        }
        Ok(contact)
    }

    fn find_secondaries_of(&self, primary_id: ContactId) -> StoreResult<Vec<Contact>> {
        self.query_contacts(
            StoreOperation::FindSecondariesOf,
            Some(primary_id),
            &format!(
                "{CONTACT_SELECT_SQL}
                 WHERE linked_id = ?
                   AND deleted_at IS NULL
                 ORDER BY created_at ASC, id ASC;"
            ),
            vec![Value::Integer(primary_id)],
        )
    }

    fn insert(&self, contact: &NewContact) -> StoreResult<Contact> {
        let inserted = self
            .conn
            .query_row(
                "INSERT INTO contacts (
                    phone_number,
                    email,
                    linked_id,
                    link_precedence
                ) VALUES (?1, ?2, ?3, ?4)
                RETURNING
                    id,
                    phone_number,
                    email,
                    linked_id,
                    link_precedence,
                    created_at,
                    updated_at,
                    deleted_at;",
                params![
                    contact.phone_number.as_deref(),
                    contact.email.as_deref(),
                    contact.linked_id,
                    contact.link_precedence.as_str(),
                ],
                parse_contact_row,
            )
            .map_err(|err| StoreError::db(StoreOperation::Insert, contact.linked_id, err))?;

        inserted.validate()?;
        Ok(inserted)
    }

    fn demote_to_secondary(&self, id: ContactId, new_primary_id: ContactId) -> StoreResult<()> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE contacts
                     SET link_precedence = 'secondary',
                         linked_id = ?2,
                         updated_at = {NOW_EPOCH_MS_SQL}
                     WHERE id = ?1
                       AND deleted_at IS NULL;"
                ),
                params![id, new_primary_id],
            )
            .map_err(|err| StoreError::db(StoreOperation::DemoteToSecondary, Some(id), err))?;

        if changed == 0 {
            return Err(StoreError::NotFound {
                operation: StoreOperation::DemoteToSecondary,
                contact_id: id,
            });
        }
        Ok(())
    }

    fn relink_secondaries(
        &self,
        old_primary_id: ContactId,
        new_primary_id: ContactId,
    ) -> StoreResult<usize> {
        self.conn
            .execute(
                &format!(
                    "UPDATE contacts
                     SET linked_id = ?2,
                         updated_at = {NOW_EPOCH_MS_SQL}
                     WHERE linked_id = ?1
                       AND deleted_at IS NULL;"
                ),
                params![old_primary_id, new_primary_id],
            )
            .map_err(|err| {
                StoreError::db(
                    StoreOperation::RelinkSecondaries,
                    Some(old_primary_id),
                    err,
                )
            })
    }

    fn with_write_scope<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<StoreError>,
    {
        // IMMEDIATE takes the database write lock up front, so the match read
        // inside `work` cannot go stale before this call's own writes.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(|err| StoreError::db(StoreOperation::BeginWriteScope, None, err))?;

        // Dropping `tx` on the error path rolls every mutation back.
        let value = work(self)?;

        tx.commit()
            .map_err(|err| StoreError::db(StoreOperation::CommitWriteScope, None, err))?;
        Ok(value)
    }
}

fn collect_contacts(
    conn: &Connection,
    sql: &str,
    bind_values: Vec<Value>,
) -> rusqlite::Result<Vec<Contact>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut contacts = Vec::new();
    while let Some(row) = rows.next()? {
        contacts.push(parse_contact_row(row)?);
    }
    Ok(contacts)
}

fn parse_contact_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    let precedence_text: String = row.get("link_precedence")?;
    let link_precedence = LinkPrecedence::parse(&precedence_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("invalid link precedence `{precedence_text}` in contacts.link_precedence")
                .into(),
        )
    })?;

    Ok(Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        phone_number: row.get("phone_number")?,
        linked_id: row.get("linked_id")?,
        link_precedence,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}
