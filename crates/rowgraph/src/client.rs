//! Driver boundary: blocking connections and forward-only cursors.
//!
//! rowgraph never speaks a wire protocol itself. A driver implements [`Connection`]
//! (one physical connection) and [`ConnectionFactory`] (how to obtain one); the
//! Postgres driver lives in [`crate::pg`].

use crate::error::OrmResult;
use crate::transaction::TransactionOptions;
use crate::value::Value;

/// Placeholder syntax the driver expects in rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...` (Postgres)
    #[default]
    Dollar,
    /// `?, ?, ...`
    Question,
}

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    /// Underlying column name.
    pub name: String,
    /// Label as written in the select list (`AS label`), used for mapping.
    pub label: String,
    /// Driver type name (e.g. `int8`, `text`).
    pub type_name: String,
}

impl ColumnMeta {
    pub fn new(label: impl Into<String>, type_name: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            name: label.clone(),
            label,
            type_name: type_name.into(),
        }
    }
}

/// A forward-only result cursor.
pub trait Cursor {
    /// Columns of this result, in select-list order.
    fn columns(&self) -> &[ColumnMeta];

    /// Advance to the next row; `Ok(None)` once exhausted.
    fn next_row(&mut self) -> OrmResult<Option<Vec<Value>>>;
}

/// A fully buffered cursor.
///
/// Drivers that receive a complete result (as `tokio-postgres` does) hand it out as a
/// `ResultSet`; tests use it to feed the mapper directly.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<ColumnMeta>,
    rows: std::vec::IntoIter<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows: rows.into_iter(),
        }
    }

    /// Build a result from bare labels (type names left empty).
    pub fn from_labels<S: AsRef<str>>(labels: &[S], rows: Vec<Vec<Value>>) -> Self {
        let columns = labels
            .iter()
            .map(|l| ColumnMeta::new(l.as_ref(), ""))
            .collect();
        Self::new(columns, rows)
    }

    /// An empty result with no columns.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

impl Cursor for ResultSet {
    fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    fn next_row(&mut self) -> OrmResult<Option<Vec<Value>>> {
        Ok(self.rows.next())
    }
}

/// One physical database connection.
///
/// All methods block the calling thread. SQL handed to a connection is already
/// rendered in its [`PlaceholderStyle`], and `params` line up with the placeholders.
pub trait Connection {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    /// Start a transaction.
    fn begin(&mut self, options: &TransactionOptions) -> OrmResult<()>;

    fn commit(&mut self) -> OrmResult<()>;

    fn rollback(&mut self) -> OrmResult<()>;

    /// Execute a query and return a cursor over its rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Box<dyn Cursor>>;

    /// Execute a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64>;

    /// Execute a statement and return the keys it generated.
    fn execute_returning(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Value>>;

    /// Execute one statement per parameter set.
    ///
    /// The default implementation runs [`Connection::execute`] in a loop.
    fn execute_batch(&mut self, sql: &str, batches: &[Vec<Value>]) -> OrmResult<Vec<u64>> {
        batches
            .iter()
            .map(|params| self.execute(sql, params))
            .collect()
    }
}

/// Hands out connections for new units of work.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self) -> OrmResult<Box<dyn Connection>>;
}

impl<F> ConnectionFactory for F
where
    F: Fn() -> OrmResult<Box<dyn Connection>> + Send + Sync,
{
    fn connect(&self) -> OrmResult<Box<dyn Connection>> {
        self()
    }
}
