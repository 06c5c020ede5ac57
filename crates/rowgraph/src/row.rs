//! Row access over a [`Cursor`](crate::client::Cursor).

use crate::client::{ColumnMeta, Cursor};
use crate::convert::FromValue;
use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column labels of one query execution.
///
/// Built once per result; labels are matched case-insensitively and a duplicated
/// label resolves to its first occurrence.
#[derive(Debug)]
pub struct RowContext {
    columns: Vec<ColumnMeta>,
    positions: HashMap<String, usize>,
}

impl RowContext {
    pub fn new(columns: Vec<ColumnMeta>) -> Self {
        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, col) in columns.iter().enumerate() {
            positions
                .entry(col.label.to_ascii_lowercase())
                .or_insert(idx);
        }
        Self { columns, positions }
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    /// Position of `label`, if the result has such a column.
    pub fn position(&self, label: &str) -> Option<usize> {
        if let Some(idx) = self.positions.get(label) {
            return Some(*idx);
        }
        self.positions.get(&label.to_ascii_lowercase()).copied()
    }

    pub fn has_column(&self, label: &str) -> bool {
        self.position(label).is_some()
    }
}

/// The current row of a cursor.
#[derive(Debug, Clone)]
pub struct Row {
    context: Arc<RowContext>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(context: Arc<RowContext>, values: Vec<Value>) -> Self {
        Self { context, values }
    }

    pub fn context(&self) -> &RowContext {
        &self.context
    }

    /// Value of column `label`; `None` if the column is absent from the result.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.context
            .position(label)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value of column `label` if present and not NULL.
    pub fn get_non_null(&self, label: &str) -> Option<&Value> {
        self.get(label).filter(|v| !v.is_null())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Try to get a column value, returning `OrmError::Decode` on failure
    pub fn try_get_column<T: FromValue>(&self, label: &str) -> OrmResult<T> {
        let value = self
            .get(label)
            .ok_or_else(|| OrmError::decode(label, "column not present in result"))?;
        T::from_value(value.clone()).map_err(|e| OrmError::decode(label, e.to_string()))
    }
}

/// Iterator over the rows of a cursor, sharing one [`RowContext`].
pub struct Rows {
    context: Arc<RowContext>,
    cursor: Box<dyn Cursor>,
    done: bool,
}

impl Rows {
    pub fn new(cursor: Box<dyn Cursor>) -> Self {
        let context = Arc::new(RowContext::new(cursor.columns().to_vec()));
        Self {
            context,
            cursor,
            done: false,
        }
    }

    pub fn context(&self) -> &Arc<RowContext> {
        &self.context
    }
}

impl Iterator for Rows {
    type Item = OrmResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.next_row() {
            Ok(Some(values)) => Some(Ok(Row::new(Arc::clone(&self.context), values))),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResultSet;

    #[test]
    fn first_duplicate_label_wins() {
        let ctx = RowContext::new(vec![
            ColumnMeta::new("id", "int8"),
            ColumnMeta::new("name", "text"),
            ColumnMeta::new("ID", "int8"),
        ]);
        assert_eq!(ctx.position("id"), Some(0));
        assert_eq!(ctx.position("Id"), Some(0));
        assert_eq!(ctx.position("missing"), None);
    }

    #[test]
    fn rows_share_one_context() {
        let rs = ResultSet::from_labels(
            &["id", "name"],
            vec![
                vec![Value::Int(1), Value::Text("a".into())],
                vec![Value::Int(2), Value::Null],
            ],
        );
        let rows: Vec<Row> = Rows::new(Box::new(rs)).collect::<OrmResult<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(std::ptr::eq(rows[0].context(), rows[1].context()));
        assert_eq!(rows[0].try_get_column::<String>("name").unwrap(), "a");
        assert!(rows[1].get("name").is_some());
        assert!(rows[1].get_non_null("name").is_none());
        assert!(rows[1].try_get_column::<i64>("nope").is_err());
    }
}
