//! Parameterized statements executed on a session.

use crate::convert::ToValue;
use crate::descriptor::describe;
use crate::entity::{Entity, EntityRef};
use crate::error::{OrmError, OrmResult};
use crate::mapper::EntityStream;
use crate::row::{Row, Rows};
use crate::session::Session;
use crate::sql::ParsedSql;
use crate::value::Value;
use std::sync::Arc;

/// A statement bound to a [`Session`], created with [`Session::create_query`].
///
/// Named (`:name`) and positional (`?`) placeholders can be mixed. Every placeholder must
/// have a value when the query runs.
///
/// ```ignore
/// let authors = session
///     .create_query(
///         "SELECT a.id, a.name, b.id AS book_id, b.title AS book_title
///          FROM authors a LEFT JOIN books b ON b.author_id = a.id
///          WHERE a.name LIKE :pattern",
///     )?
///     .set("pattern", "A%")?
///     .fetch_as::<Author>()?;
/// ```
pub struct Query {
    session: Session,
    parsed: Arc<ParsedSql>,
    values: Vec<Option<Value>>,
    batch: Vec<Vec<Value>>,
    tag: Option<String>,
}

impl Query {
    pub(crate) fn new(session: Session, parsed: Arc<ParsedSql>) -> Self {
        let values = vec![None; parsed.placeholders().len()];
        Self {
            session,
            parsed,
            values,
            batch: Vec::new(),
            tag: None,
        }
    }

    /// The statement as written.
    pub fn sql(&self) -> &str {
        self.parsed.source()
    }

    pub fn parsed(&self) -> &ParsedSql {
        &self.parsed
    }

    /// Label carried on this query's log events.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Set the named parameter `name`.
    pub fn set(mut self, name: &str, value: impl ToValue) -> OrmResult<Self> {
        let slot = self
            .parsed
            .slot_of_name(name)
            .ok_or_else(|| OrmError::UnknownParameter(name.to_string()))?;
        self.values[slot] = Some(value.to_value());
        Ok(self)
    }

    /// Set the `index`-th `?` parameter (1-based, named placeholders not counted).
    pub fn set_at(mut self, index: usize, value: impl ToValue) -> OrmResult<Self> {
        let slot = self
            .parsed
            .slot_of_position(index)
            .ok_or(OrmError::ParameterIndex {
                index,
                count: self.parsed.positional_count(),
            })?;
        self.values[slot] = Some(value.to_value());
        Ok(self)
    }

    /// Set every named parameter that matches a scalar field of `entity`.
    ///
    /// Parameters without a matching field are left as they are.
    pub fn bind<T: Entity>(mut self, entity: &T) -> OrmResult<Self> {
        let desc = describe::<T>()?;
        for (slot, name) in self.parsed.named_slots() {
            if let Some(value) = desc.read(entity, name) {
                self.values[slot] = Some(value);
            }
        }
        Ok(self)
    }

    /// Values in placeholder order, or the list of unset placeholders.
    pub fn params(&self) -> OrmResult<Vec<Value>> {
        let missing: Vec<String> = self
            .values
            .iter()
            .zip(self.parsed.placeholders())
            .filter(|(value, _)| value.is_none())
            .map(|(_, placeholder)| placeholder.display_name())
            .collect();
        if !missing.is_empty() {
            return Err(OrmError::MissingParameters(missing));
        }
        Ok(self.values.iter().flatten().cloned().collect())
    }

    fn render(&self) -> String {
        self.parsed.render(self.session.placeholder_style())
    }

    fn log(&self, op: &'static str, params: usize) {
        tracing::debug!(
            session = self.session.id(),
            tag = self.tag.as_deref().unwrap_or(""),
            op,
            params,
            sql = %self.parsed.source(),
            "execute"
        );
    }

    /// Run the query and return its raw rows.
    pub fn rows(&self) -> OrmResult<Rows> {
        let params = self.params()?;
        let sql = self.render();
        self.log("query", params.len());
        let cursor = self
            .session
            .with_connection(|conn| conn.query(&sql, &params))?;
        Ok(Rows::new(cursor))
    }

    /// Run the query and collect its raw rows.
    pub fn fetch_rows(&self) -> OrmResult<Vec<Row>> {
        self.rows()?.collect()
    }

    /// Run the query and map its rows into `T` lazily.
    ///
    /// Entities with deferred fields are bound to this query's session.
    pub fn stream_as<T: Entity>(&self) -> OrmResult<EntityStream<T>> {
        let params = self.params()?;
        let sql = self.render();
        self.log("query", params.len());
        let cursor = self
            .session
            .with_connection(|conn| conn.query(&sql, &params))?;
        EntityStream::new(cursor, Some(self.session.handle()))
    }

    /// Run the query and collect its distinct `T` entities.
    pub fn fetch_as<T: Entity>(&self) -> OrmResult<Vec<EntityRef<T>>> {
        self.stream_as::<T>()?.collect()
    }

    /// Run the query expecting at most one distinct `T`.
    pub fn unique_result_as<T: Entity>(&self) -> OrmResult<Option<EntityRef<T>>> {
        let mut found = self.fetch_as::<T>()?;
        match found.len() {
            0 | 1 => Ok(found.pop()),
            n => Err(OrmError::too_many_rows(1, n)),
        }
    }

    /// Run the query expecting exactly one distinct `T`.
    pub fn single_result_as<T: Entity>(&self) -> OrmResult<EntityRef<T>> {
        self.unique_result_as::<T>()?
            .ok_or_else(|| OrmError::not_found(format!("no row for: {}", self.sql())))
    }

    /// Run a write and return the keys it generated (`RETURNING` values).
    pub fn execute_update(&self) -> OrmResult<Vec<Value>> {
        let params = self.params()?;
        let sql = self.render();
        self.log("update", params.len());
        self.session
            .with_connection(|conn| conn.execute_returning(&sql, &params))
    }

    /// Run a write and return the affected row count.
    pub fn execute(&self) -> OrmResult<u64> {
        let params = self.params()?;
        let sql = self.render();
        self.log("execute", params.len());
        self.session
            .with_connection(|conn| conn.execute(&sql, &params))
    }

    /// Queue the current parameter values as one batch entry and clear them.
    pub fn add_batch(mut self) -> OrmResult<Self> {
        let params = self.params()?;
        self.batch.push(params);
        self.values.iter_mut().for_each(|v| *v = None);
        Ok(self)
    }

    /// Number of queued batch entries.
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    /// Run the statement once per queued entry; returns each affected row count.
    ///
    /// Values set after the last [`add_batch`](Self::add_batch) are not executed.
    pub fn execute_batch(&self) -> OrmResult<Vec<u64>> {
        if self.batch.is_empty() {
            return Ok(Vec::new());
        }
        let sql = self.render();
        tracing::debug!(
            session = self.session.id(),
            tag = self.tag.as_deref().unwrap_or(""),
            entries = self.batch.len(),
            sql = %self.parsed.source(),
            "execute batch"
        );
        self.session
            .with_connection(|conn| conn.execute_batch(&sql, &self.batch))
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("sql", &self.parsed.source())
            .field("values", &self.values)
            .field("batch", &self.batch.len())
            .field("tag", &self.tag)
            .finish()
    }
}
