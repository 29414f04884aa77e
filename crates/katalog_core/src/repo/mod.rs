//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for categories and
//!   products.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Write paths must call the entity `validate()` before SQL mutations.
//! - Point-lookup misses are `Ok(None)`, never an error.
//! - Bulk statements require an active unit of work on the session.

use crate::db::{migrations, DbError};
use crate::model::ValidationError;
use crate::tx::{Session, TxError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod category_repo;
pub mod product_repo;
pub mod query;

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for catalog persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    Tx(TxError),
    NotFound { entity: &'static str, id: i64 },
    /// A required reference is missing or still in use at commit time.
    ConstraintViolation(String),
    /// A bulk statement was issued outside an active unit of work.
    NoActiveTransaction { operation: &'static str },
    /// The entity has no identity yet and the operation requires one.
    TransientEntity(&'static str),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Tx(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::ConstraintViolation(message) => {
                write!(f, "constraint violation: {message}")
            }
            Self::NoActiveTransaction { operation } => {
                write!(f, "{operation} requires an active transaction")
            }
            Self::TransientEntity(entity) => {
                write!(f, "{entity} has no identity; save it first")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "required table `{table}` is missing")
            }
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "required column `{table}.{column}` is missing")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Tx(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<TxError> for RepoError {
    fn from(value: TxError) -> Self {
        Self::Tx(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Maps SQLite constraint failures (foreign key, CHECK) to the semantic
/// error; everything else stays a transport error.
pub(crate) fn map_constraint(err: rusqlite::Error, context: &'static str) -> RepoError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            let detail = message.clone().unwrap_or_else(|| code.to_string());
            return RepoError::ConstraintViolation(format!("{context}: {detail}"));
        }
    }
    err.into()
}

/// Rejects bulk statements issued outside a unit of work.
pub(crate) fn ensure_active_transaction(
    session: &Session,
    operation: &'static str,
) -> RepoResult<()> {
    if !session.in_transaction() {
        return Err(RepoError::NoActiveTransaction { operation });
    }
    Ok(())
}

/// Verifies the connection has been migrated and carries the table shape
/// this repository was compiled against.
pub(crate) fn ensure_connection_ready(
    conn: &Connection,
    table: &'static str,
    columns: &[&'static str],
) -> RepoResult<()> {
    let expected_version = migrations::latest_version();
    let actual_version = migrations::current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table));
    }
    for column in columns {
        if !table_has_column(conn, table, column)? {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
