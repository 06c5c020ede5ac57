//! Units of work: transaction scoping over a [`ConnectionFactory`].
//!
//! [`Database::query`] is the top-level entry: it takes a connection, begins a
//! transaction, hands the resulting [`Session`] to the closure, then commits on `Ok`
//! or rolls back on `Err`. Inside the closure, repository code receives the same
//! session and may call [`UnitOfWork::query`] on it again; nested calls reuse the
//! session and never commit on their own.
//!
//! Each thread remembers the session its databases have open. Calling
//! [`Database::query`] again on the same thread while that session is active joins it
//! instead of opening a second connection.
//!
//! ```ignore
//! use rowgraph::{Database, OrmResult, UnitOfWork};
//!
//! fn rename(uow: &impl UnitOfWork, id: i64, name: &str) -> OrmResult<u64> {
//!     uow.query(|session| {
//!         session
//!             .create_query("UPDATE authors SET name = :name WHERE id = :id")?
//!             .set("name", name)?
//!             .set("id", id)?
//!             .execute()
//!     })
//! }
//!
//! let db = Database::connect(&config)?;
//! // Own transaction:
//! rename(&db, 1, "Ann")?;
//! // Part of a larger one:
//! db.open(|session| {
//!     rename(session, 1, "Ann")?;
//!     rename(session, 2, "Bob")?;
//!     Ok(())
//! })?;
//! ```

use crate::client::ConnectionFactory;
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::pg::PgConnector;
use crate::session::{Session, SessionHandle};
use serde::Deserialize;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

thread_local! {
    // Sessions begun on this thread, keyed by the database that opened them.
    static ACTIVE: RefCell<Vec<(usize, SessionHandle)>> = const { RefCell::new(Vec::new()) };
}

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionIsolation {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl TransactionIsolation {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options applied when a unit of work begins its transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    pub isolation: Option<TransactionIsolation>,
    pub read_only: Option<bool>,
    pub deferrable: Option<bool>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: TransactionIsolation) -> Self {
        self.isolation = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = Some(deferrable);
        self
    }

    /// The `BEGIN` statement for these options.
    pub fn begin_sql(&self) -> String {
        let mut sql = String::from("BEGIN");
        if let Some(level) = self.isolation {
            sql.push_str(" ISOLATION LEVEL ");
            sql.push_str(level.as_sql());
        }
        match self.read_only {
            Some(true) => sql.push_str(" READ ONLY"),
            Some(false) => sql.push_str(" READ WRITE"),
            None => {}
        }
        match self.deferrable {
            Some(true) => sql.push_str(" DEFERRABLE"),
            Some(false) => sql.push_str(" NOT DEFERRABLE"),
            None => {}
        }
        sql
    }
}

/// Something a unit of work can run on: a [`Database`] (opens its own transaction)
/// or a [`Session`] (joins the enclosing one).
///
/// Repository functions taking `&impl UnitOfWork` compose with or without an
/// enclosing unit of work.
pub trait UnitOfWork {
    /// Run `work` and return its result.
    fn query<R, F>(&self, work: F) -> OrmResult<R>
    where
        F: FnOnce(&Session) -> OrmResult<R>;

    /// Run `work` for its side effects.
    fn open<F>(&self, work: F) -> OrmResult<()>
    where
        F: FnOnce(&Session) -> OrmResult<()>,
    {
        self.query(work)
    }
}

impl UnitOfWork for Session {
    /// Nested unit of work: runs on this session, errors propagate unchanged.
    fn query<R, F>(&self, work: F) -> OrmResult<R>
    where
        F: FnOnce(&Session) -> OrmResult<R>,
    {
        self.ensure_open()?;
        work(self)
    }
}

/// Entry point: hands out one connection per top-level unit of work.
#[derive(Clone)]
pub struct Database {
    factory: Arc<dyn ConnectionFactory>,
    options: TransactionOptions,
}

impl Database {
    pub fn new(factory: impl ConnectionFactory + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
            options: TransactionOptions::default(),
        }
    }

    /// A Postgres-backed database from `config`.
    pub fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let connector = PgConnector::new(config)?;
        Ok(Self::new(connector).with_options(config.transaction.clone()))
    }

    /// Options for every transaction this database begins.
    pub fn with_options(mut self, options: TransactionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Begin a session the caller commits or rolls back itself.
    ///
    /// Dropping the session while it is still active rolls it back. Fails with
    /// [`OrmError::SessionActive`] if this database already has an active session on
    /// the current thread.
    pub fn begin(&self) -> OrmResult<Session> {
        if self.active_session().is_some() {
            return Err(OrmError::SessionActive);
        }
        let conn = self.factory.connect()?;
        let session = Session::begin(conn, &self.options)?;
        let key = self.registry_key();
        let handle = session.handle();
        ACTIVE.with(|active| active.borrow_mut().push((key, handle)));
        Ok(session)
    }

    /// The session this database has active on the current thread, if any.
    pub fn active_session(&self) -> Option<Session> {
        let key = self.registry_key();
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            active.retain(|(_, handle)| handle.is_open());
            active
                .iter()
                .rev()
                .find(|(k, _)| *k == key)
                .and_then(|(_, handle)| handle.upgrade().ok())
        })
    }

    fn registry_key(&self) -> usize {
        Arc::as_ptr(&self.factory) as *const () as usize
    }
}

impl UnitOfWork for Database {
    /// Top-level unit of work: commit on `Ok`, roll back and return
    /// [`OrmError::RolledBack`] on `Err`.
    ///
    /// If this database already has an active session on the current thread, `work`
    /// joins it like [`Session::query`] does.
    fn query<R, F>(&self, work: F) -> OrmResult<R>
    where
        F: FnOnce(&Session) -> OrmResult<R>,
    {
        if let Some(session) = self.active_session() {
            tracing::debug!(session = session.id(), "joining active session");
            return session.query(work);
        }
        let session = self.begin()?;
        match work(&session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(error) => match session.rollback() {
                Ok(()) => Err(OrmError::rolled_back(error)),
                Err(rollback_err) => {
                    tracing::warn!(session = session.id(), error = %rollback_err, "rollback failed");
                    Err(OrmError::rollback_failed(error, rollback_err))
                }
            },
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_sql_defaults_to_plain_begin() {
        assert_eq!(TransactionOptions::new().begin_sql(), "BEGIN");
    }

    #[test]
    fn begin_sql_renders_every_option() {
        let opts = TransactionOptions::new()
            .isolation_level(TransactionIsolation::Serializable)
            .read_only(true)
            .deferrable(true);
        assert_eq!(
            opts.begin_sql(),
            "BEGIN ISOLATION LEVEL SERIALIZABLE READ ONLY DEFERRABLE"
        );
        let opts = TransactionOptions::new()
            .isolation_level(TransactionIsolation::ReadCommitted)
            .read_only(false);
        assert_eq!(
            opts.begin_sql(),
            "BEGIN ISOLATION LEVEL READ COMMITTED READ WRITE"
        );
    }
}
