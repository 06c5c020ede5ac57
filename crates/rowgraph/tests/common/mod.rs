//! In-memory driver for integration tests.
//!
//! Understands a handful of statements against one `items(id, name)` table, plus
//! scripted results matched by SQL prefix. Writes are buffered per transaction and
//! applied on commit.

#![allow(dead_code)]

use rowgraph::{
    ColumnMeta, Connection, Database, OrmError, OrmResult, PlaceholderStyle, ResultSet,
    TransactionOptions, Value,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;

pub const INSERT_ITEM: &str = "INSERT INTO items (name) VALUES";
pub const SELECT_ITEMS: &str = "SELECT id, name FROM items";
pub const FAIL: &str = "FAIL";

#[derive(Default)]
struct State {
    items: BTreeMap<i64, String>,
    next_id: i64,
    scripts: Vec<Script>,
    log: Vec<(String, Vec<Value>)>,
    connections: Vec<ThreadId>,
    begins: Vec<String>,
    commits: usize,
    rollbacks: usize,
    fail_rollbacks: bool,
}

struct Script {
    prefix: String,
    labels: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Shared backing store; every connection it opens sees the committed items.
#[derive(Clone, Default)]
pub struct FakeDb {
    state: Arc<Mutex<State>>,
}

impl FakeDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Answer queries starting with `prefix` with `rows`.
    pub fn script(&self, prefix: &str, labels: &[&str], rows: Vec<Vec<Value>>) {
        self.state().scripts.push(Script {
            prefix: prefix.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            rows,
        });
    }

    pub fn database(&self) -> Database {
        let db = self.clone();
        Database::new(move || -> OrmResult<Box<dyn Connection>> { Ok(Box::new(db.connect())) })
    }

    pub fn connect(&self) -> FakeConnection {
        self.state().connections.push(std::thread::current().id());
        FakeConnection {
            db: self.clone(),
            pending: Vec::new(),
            in_tx: false,
        }
    }

    /// Committed item names, ordered by id.
    pub fn items(&self) -> Vec<String> {
        self.state().items.values().cloned().collect()
    }

    /// Every statement executed so far, as rendered for the driver.
    pub fn statements(&self) -> Vec<String> {
        self.state().log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn last_params(&self) -> Vec<Value> {
        self.state()
            .log
            .last()
            .map(|(_, params)| params.clone())
            .unwrap_or_default()
    }

    /// Statements starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state()
            .log
            .iter()
            .filter(|(sql, _)| sql.starts_with(prefix))
            .count()
    }

    pub fn connection_threads(&self) -> Vec<ThreadId> {
        self.state().connections.clone()
    }

    pub fn begins(&self) -> Vec<String> {
        self.state().begins.clone()
    }

    pub fn commits(&self) -> usize {
        self.state().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.state().rollbacks
    }

    /// Make every later `ROLLBACK` report a driver error (writes are still discarded).
    pub fn fail_rollbacks(&self) {
        self.state().fail_rollbacks = true;
    }
}

pub struct FakeConnection {
    db: FakeDb,
    pending: Vec<(i64, String)>,
    in_tx: bool,
}

impl FakeConnection {
    fn record(&self, sql: &str, params: &[Value]) {
        self.db.state().log.push((sql.to_string(), params.to_vec()));
    }

    fn insert(&mut self, params: &[Value]) -> OrmResult<i64> {
        let name = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| OrmError::Driver("insert needs a text name".into()))?
            .to_string();
        let id = {
            let mut state = self.db.state();
            state.next_id += 1;
            state.next_id
        };
        self.pending.push((id, name));
        Ok(id)
    }
}

impl Connection for FakeConnection {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }

    fn begin(&mut self, options: &TransactionOptions) -> OrmResult<()> {
        self.in_tx = true;
        self.db.state().begins.push(options.begin_sql());
        Ok(())
    }

    fn commit(&mut self) -> OrmResult<()> {
        let mut state = self.db.state();
        state.items.extend(self.pending.drain(..));
        state.commits += 1;
        self.in_tx = false;
        Ok(())
    }

    fn rollback(&mut self) -> OrmResult<()> {
        self.pending.clear();
        self.in_tx = false;
        let mut state = self.db.state();
        state.rollbacks += 1;
        if state.fail_rollbacks {
            return Err(OrmError::Driver("rollback lost the connection".into()));
        }
        Ok(())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Box<dyn rowgraph::Cursor>> {
        self.record(sql, params);
        if sql.starts_with(FAIL) {
            return Err(OrmError::Driver("scripted failure".into()));
        }
        if sql.starts_with(SELECT_ITEMS) {
            let mut rows: Vec<(i64, String)> = self
                .db
                .state()
                .items
                .iter()
                .map(|(id, name)| (*id, name.clone()))
                .collect();
            rows.extend(self.pending.iter().cloned());
            if let Some(id) = params.first().and_then(Value::as_i64) {
                rows.retain(|(row_id, _)| *row_id == id);
            }
            let columns = vec![ColumnMeta::new("id", "int8"), ColumnMeta::new("name", "text")];
            let rows = rows
                .into_iter()
                .map(|(id, name)| vec![Value::Int(id), Value::Text(name)])
                .collect();
            return Ok(Box::new(ResultSet::new(columns, rows)));
        }
        let state = self.db.state();
        let script = state
            .scripts
            .iter()
            .find(|s| sql.starts_with(&s.prefix))
            .ok_or_else(|| OrmError::Driver(format!("no scripted result for: {sql}")))?;
        Ok(Box::new(ResultSet::from_labels(
            &script.labels,
            script.rows.clone(),
        )))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        self.record(sql, params);
        if sql.starts_with(INSERT_ITEM) {
            self.insert(params)?;
            return Ok(1);
        }
        if sql.starts_with(FAIL) {
            return Err(OrmError::Driver("scripted failure".into()));
        }
        Ok(0)
    }

    fn execute_returning(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Value>> {
        self.record(sql, params);
        if sql.starts_with(INSERT_ITEM) {
            let id = self.insert(params)?;
            return Ok(vec![Value::Int(id)]);
        }
        Err(OrmError::Driver(format!("no generated keys for: {sql}")))
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            assert!(!self.in_tx, "connection released with an open transaction");
        }
    }
}
