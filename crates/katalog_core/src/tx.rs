//! Unit-of-work state machine over one SQLite connection.
//!
//! # Responsibility
//! - Own the connection handed to repositories and track the state of the
//!   current unit of work (`NotStarted -> Active -> Committed | RolledBack`).
//! - Provide the three transaction control surfaces: the scoped
//!   [`Session::execute`] wrapper, and the manual
//!   [`TransactionManager`] begin/commit/rollback API.
//!
//! # Invariants
//! - Transactions are driven with explicit `BEGIN DEFERRED` / `COMMIT` /
//!   `ROLLBACK` statements; opening a unit of work never blocks.
//! - `Propagation::Required` joins an already-active unit of work instead
//!   of nesting; a joined rollback marks the whole unit of work
//!   rollback-only.
//! - Writes issued while `Active` become visible to other sessions only
//!   atomically at commit.

use crate::db::{DbError, DbResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

pub type TxResult<T> = Result<T, TxError>;

/// Transaction control failure.
#[derive(Debug)]
pub enum TxError {
    Db(DbError),
    /// Commit or rollback was issued through a handle that already
    /// completed, or whose unit of work has ended.
    AlreadyCompleted,
    /// No unit of work is active on this session.
    NoActiveTransaction,
    /// A participating handle requested rollback, so the owning commit was
    /// turned into a rollback.
    UnexpectedRollback,
    /// The unit of work stayed open longer than its configured timeout.
    TimeoutExceeded {
        timeout: Duration,
        elapsed: Duration,
    },
}

impl Display for TxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::AlreadyCompleted => write!(f, "transaction handle is already completed"),
            Self::NoActiveTransaction => write!(f, "no transaction is active on this session"),
            Self::UnexpectedRollback => {
                write!(f, "transaction was marked rollback-only and has been rolled back")
            }
            Self::TimeoutExceeded { timeout, elapsed } => write!(
                f,
                "transaction exceeded its timeout of {}ms after {}ms",
                timeout.as_millis(),
                elapsed.as_millis()
            ),
        }
    }
}

impl Error for TxError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for TxError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TxError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Per-unit-of-work lifecycle state. `Committed` and `RolledBack` are
/// terminal; the next `get_transaction` starts a fresh unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    NotStarted,
    Active,
    Committed,
    RolledBack,
}

/// How a new transaction request relates to an already-active unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Join the caller's active unit of work when one exists, else start a
    /// new one.
    Required,
}

/// Caller-supplied boundary configuration for the manual control style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionDefinition {
    pub propagation: Propagation,
    /// Bounds the unit of work's total open duration.
    pub timeout: Option<Duration>,
}

impl TransactionDefinition {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            propagation: Propagation::Required,
            timeout: Some(timeout),
        }
    }
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            timeout: None,
        }
    }
}

/// Handle for one begin/commit/rollback round-trip.
///
/// An owning handle (`is_new() == true`) decides the unit of work's
/// outcome; a participating handle joined an outer unit of work and can
/// only veto it by requesting rollback.
#[derive(Debug)]
pub struct TransactionStatus {
    sequence: u64,
    new: bool,
    completed: Cell<bool>,
}

impl TransactionStatus {
    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

#[derive(Debug)]
struct TxInner {
    state: TxState,
    sequence: u64,
    rollback_only: bool,
    deadline: Option<Instant>,
    started_at: Option<Instant>,
}

/// Connection plus unit-of-work state for one logical thread of control.
///
/// Concurrency comes from independent sessions opened on the same
/// database file, never from sharing one session.
pub struct Session {
    conn: Connection,
    inner: RefCell<TxInner>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            inner: RefCell::new(TxInner {
                state: TxState::NotStarted,
                sequence: 0,
                rollback_only: false,
                deadline: None,
                started_at: None,
            }),
        }
    }

    /// Raw connection access for repository implementations.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Current state of this session's unit of work.
    pub fn transaction_state(&self) -> TxState {
        self.inner.borrow().state
    }

    /// Returns whether a unit of work is currently active.
    pub fn in_transaction(&self) -> bool {
        self.transaction_state() == TxState::Active
    }

    /// Runs `body` inside a unit of work with the default definition.
    ///
    /// This is the single scoped-acquisition construct shared by the
    /// declarative and programmatic call styles: commit on `Ok`, rollback
    /// and re-propagate the body's error unchanged on `Err`.
    pub fn execute<T, E>(&self, body: impl FnOnce(&Session) -> Result<T, E>) -> Result<T, E>
    where
        E: From<TxError>,
    {
        self.execute_with(&TransactionDefinition::default(), body)
    }

    /// Runs `body` inside a unit of work configured by `definition`.
    pub fn execute_with<T, E>(
        &self,
        definition: &TransactionDefinition,
        body: impl FnOnce(&Session) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<TxError>,
    {
        let manager = TransactionManager::new(self);
        let status = manager.get_transaction(definition).map_err(E::from)?;
        match body(self) {
            Ok(value) => {
                manager.commit(&status).map_err(E::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = manager.rollback(&status) {
                    error!(
                        "event=tx_rollback module=tx status=error error_code=rollback_failed error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.inner.borrow().state;
        if state == TxState::Active {
            warn!("event=tx_rollback module=tx status=ok reason=session_dropped_while_active");
            let _ = self.conn.execute_batch("ROLLBACK;");
        }
    }
}

/// Manual transaction control surface over one session.
pub struct TransactionManager<'s> {
    session: &'s Session,
}

impl<'s> TransactionManager<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Opens a new unit of work, or joins the active one under
    /// `Propagation::Required`. Never blocks.
    pub fn get_transaction(
        &self,
        definition: &TransactionDefinition,
    ) -> TxResult<TransactionStatus> {
        let mut inner = self.session.inner.borrow_mut();
        if inner.state == TxState::Active {
            // Required propagation: participate in the active unit of work.
            if let Some(err) = deadline_exceeded(&inner) {
                inner.rollback_only = true;
                return Err(err);
            }
            info!(
                "event=tx_join module=tx status=ok sequence={}",
                inner.sequence
            );
            return Ok(TransactionStatus {
                sequence: inner.sequence,
                new: false,
                completed: Cell::new(false),
            });
        }

        self.session.conn.execute_batch("BEGIN DEFERRED;")?;
        inner.sequence += 1;
        inner.state = TxState::Active;
        inner.rollback_only = false;
        inner.started_at = Some(Instant::now());
        inner.deadline = definition.timeout.map(|timeout| Instant::now() + timeout);
        info!(
            "event=tx_begin module=tx status=ok sequence={} timeout_ms={}",
            inner.sequence,
            definition
                .timeout
                .map_or(-1, |timeout| timeout.as_millis() as i64)
        );
        Ok(TransactionStatus {
            sequence: inner.sequence,
            new: true,
            completed: Cell::new(false),
        })
    }

    /// Commits the unit of work owned by `status`.
    ///
    /// A participating handle completes without touching the outer unit of
    /// work. An owning commit turns into a rollback when the unit of work
    /// was marked rollback-only or exceeded its timeout.
    pub fn commit(&self, status: &TransactionStatus) -> TxResult<()> {
        self.complete(status)?;
        if !status.new {
            return Ok(());
        }

        let mut inner = self.session.inner.borrow_mut();
        ensure_owning(&inner, status)?;

        if let Some(err) = deadline_exceeded(&inner) {
            self.session.conn.execute_batch("ROLLBACK;")?;
            inner.state = TxState::RolledBack;
            info!(
                "event=tx_timeout module=tx status=error sequence={} duration_ms={}",
                inner.sequence,
                elapsed_ms(&inner)
            );
            return Err(err);
        }

        if inner.rollback_only {
            self.session.conn.execute_batch("ROLLBACK;")?;
            inner.state = TxState::RolledBack;
            info!(
                "event=tx_rollback module=tx status=ok sequence={} reason=rollback_only",
                inner.sequence
            );
            return Err(TxError::UnexpectedRollback);
        }

        self.session.conn.execute_batch("COMMIT;")?;
        inner.state = TxState::Committed;
        info!(
            "event=tx_commit module=tx status=ok sequence={} duration_ms={}",
            inner.sequence,
            elapsed_ms(&inner)
        );
        Ok(())
    }

    /// Rolls back the unit of work owned by `status`.
    ///
    /// Safe to call when no writes occurred. A participating handle marks
    /// the outer unit of work rollback-only instead of ending it.
    pub fn rollback(&self, status: &TransactionStatus) -> TxResult<()> {
        self.complete(status)?;
        let mut inner = self.session.inner.borrow_mut();

        if !status.new {
            if inner.state == TxState::Active && inner.sequence == status.sequence {
                inner.rollback_only = true;
                info!(
                    "event=tx_rollback_only module=tx status=ok sequence={}",
                    inner.sequence
                );
            }
            return Ok(());
        }

        ensure_owning(&inner, status)?;
        self.session.conn.execute_batch("ROLLBACK;")?;
        inner.state = TxState::RolledBack;
        info!(
            "event=tx_rollback module=tx status=ok sequence={} duration_ms={}",
            inner.sequence,
            elapsed_ms(&inner)
        );
        Ok(())
    }

    fn complete(&self, status: &TransactionStatus) -> TxResult<()> {
        if status.completed.get() {
            return Err(TxError::AlreadyCompleted);
        }
        status.completed.set(true);
        Ok(())
    }
}

fn ensure_owning(inner: &TxInner, status: &TransactionStatus) -> TxResult<()> {
    if inner.state != TxState::Active || inner.sequence != status.sequence {
        return Err(TxError::NoActiveTransaction);
    }
    Ok(())
}

fn deadline_exceeded(inner: &TxInner) -> Option<TxError> {
    let deadline = inner.deadline?;
    let now = Instant::now();
    if now < deadline {
        return None;
    }
    let started_at = inner.started_at.unwrap_or(deadline);
    Some(TxError::TimeoutExceeded {
        timeout: deadline.duration_since(started_at),
        elapsed: now.duration_since(started_at),
    })
}

fn elapsed_ms(inner: &TxInner) -> u128 {
    inner
        .started_at
        .map_or(0, |started_at| started_at.elapsed().as_millis())
}
