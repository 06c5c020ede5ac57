//! The connection-owning side of a unit of work.
//!
//! A [`Session`] owns exactly one open transaction on one connection. It is handed to
//! the unit-of-work closure by reference and reused by every nested unit of work that
//! receives it. `Session` is `!Send`: neither it nor the lazy fields bound to it can
//! reach another thread.

use crate::client::{Connection, PlaceholderStyle};
use crate::error::{OrmError, OrmResult};
use crate::query::Query;
use crate::sql::ParsedSql;
use crate::transaction::TransactionOptions;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transaction open, connection held.
    Active,
    /// Committed or rolled back; the connection is released.
    Closed,
}

struct SessionInner {
    id: u64,
    conn: RefCell<Option<Box<dyn Connection>>>,
    style: PlaceholderStyle,
    state: Cell<SessionState>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.get_mut().take() {
            tracing::warn!(session = self.id, "session dropped while active; rolling back");
            if let Err(e) = conn.rollback() {
                tracing::warn!(session = self.id, error = %e, "rollback on drop failed");
            }
        }
    }
}

/// One active unit of work: a connection with an open transaction.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

/// Non-owning reference to a session, held by bound lazy fields.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Weak<SessionInner>,
}

impl SessionHandle {
    /// The session, if it is still open.
    pub fn upgrade(&self) -> OrmResult<Session> {
        let inner = self.inner.upgrade().ok_or(OrmError::SessionClosed)?;
        let session = Session { inner };
        session.ensure_open()?;
        Ok(session)
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.state.get() == SessionState::Active)
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("open", &self.is_open())
            .finish()
    }
}

impl Session {
    /// Begin a transaction on `conn` and wrap it in an active session.
    pub(crate) fn begin(
        mut conn: Box<dyn Connection>,
        options: &TransactionOptions,
    ) -> OrmResult<Self> {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        conn.begin(options)?;
        tracing::debug!(session = id, sql = %options.begin_sql(), "session begin");
        let style = conn.placeholder_style();
        Ok(Self {
            inner: Rc::new(SessionInner {
                id,
                conn: RefCell::new(Some(conn)),
                style,
                state: Cell::new(SessionState::Active),
            }),
        })
    }

    /// Process-unique id, used in log events.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub(crate) fn ensure_open(&self) -> OrmResult<()> {
        match self.state() {
            SessionState::Active => Ok(()),
            SessionState::Closed => Err(OrmError::SessionClosed),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Placeholder syntax of the underlying driver.
    pub fn placeholder_style(&self) -> PlaceholderStyle {
        self.inner.style
    }

    /// Parse `sql` into a query on this session.
    pub fn create_query(&self, sql: &str) -> OrmResult<Query> {
        self.ensure_open()?;
        let parsed = ParsedSql::parse(sql)?;
        Ok(Query::new(self.clone(), Arc::new(parsed)))
    }

    pub(crate) fn query_parsed(&self, parsed: Arc<ParsedSql>) -> OrmResult<Query> {
        self.ensure_open()?;
        Ok(Query::new(self.clone(), parsed))
    }

    /// Run `f` against the session's connection.
    pub(crate) fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> OrmResult<R>,
    ) -> OrmResult<R> {
        self.ensure_open()?;
        let mut guard = self
            .inner
            .conn
            .try_borrow_mut()
            .map_err(|_| OrmError::Other("session connection is already in use".into()))?;
        let conn = guard.as_mut().ok_or(OrmError::SessionClosed)?;
        f(conn.as_mut())
    }

    fn close(&self) -> OrmResult<Box<dyn Connection>> {
        self.ensure_open()?;
        let conn = self
            .inner
            .conn
            .try_borrow_mut()
            .map_err(|_| OrmError::Other("session connection is already in use".into()))?
            .take()
            .ok_or(OrmError::SessionClosed)?;
        self.inner.state.set(SessionState::Closed);
        Ok(conn)
    }

    /// Commit the transaction and close the session.
    pub fn commit(&self) -> OrmResult<()> {
        let mut conn = self.close()?;
        tracing::debug!(session = self.id(), "session commit");
        conn.commit()
    }

    /// Roll the transaction back and close the session.
    pub fn rollback(&self) -> OrmResult<()> {
        let mut conn = self.close()?;
        tracing::debug!(session = self.id(), "session rollback");
        conn.rollback()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
