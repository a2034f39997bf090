// Strongbox — Prepared Statements
//
// The caller-facing statement contract: `bind`, `get`, `all`, `run`, `free`.
// A statement borrows its engine's connection, so it cannot outlive the
// handle it was prepared on; `free()` releases it early.

use std::sync::Arc;

use rusqlite::params_from_iter;
use rusqlite::types::Value;
use rusqlite::Connection;

use super::StoreError;

/// Result of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    pub changes: usize,
    pub last_insert_id: i64,
}

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// JSON object keyed by column name. Blobs are rendered as hex.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => serde_json::Value::from(*n),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Blob(b) => serde_json::Value::String(hex::encode(b)),
    }
}

/// A compiled statement bound to one connection.
pub struct Statement<'conn> {
    conn: &'conn Connection,
    inner: Option<rusqlite::Statement<'conn>>,
    bound: Vec<Value>,
}

impl<'conn> Statement<'conn> {
    pub(crate) fn new(conn: &'conn Connection, sql: &str) -> Result<Self, StoreError> {
        Ok(Self {
            conn,
            inner: Some(conn.prepare(sql)?),
            bound: Vec::new(),
        })
    }

    /// Remember parameters for later calls that pass an empty slice.
    pub fn bind(&mut self, params: &[Value]) -> Result<&mut Self, StoreError> {
        if self.inner.is_none() {
            return Err(StoreError::StatementFreed);
        }
        self.bound = params.to_vec();
        Ok(self)
    }

    /// First row, or `None` when the query matches nothing.
    pub fn get(&mut self, params: &[Value]) -> Result<Option<Row>, StoreError> {
        let (stmt, params) = self.parts(params)?;
        let columns = column_names(stmt);
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => Ok(Some(read_row(&columns, row)?)),
            None => Ok(None),
        }
    }

    /// Every row.
    pub fn all(&mut self, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let (stmt, params) = self.parts(params)?;
        let columns = column_names(stmt);
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(&columns, row)?);
        }
        Ok(out)
    }

    /// Execute a mutating statement.
    pub fn run(&mut self, params: &[Value]) -> Result<RunResult, StoreError> {
        let conn = self.conn;
        let (stmt, params) = self.parts(params)?;
        let changes = stmt.execute(params_from_iter(params.iter()))?;
        Ok(RunResult {
            changes,
            last_insert_id: conn.last_insert_rowid(),
        })
    }

    /// Release the compiled statement. Safe to call more than once.
    pub fn free(&mut self) {
        self.inner = None;
        self.bound.clear();
    }

    pub fn is_freed(&self) -> bool {
        self.inner.is_none()
    }

    fn parts<'a>(
        &'a mut self,
        params: &'a [Value],
    ) -> Result<(&'a mut rusqlite::Statement<'conn>, &'a [Value]), StoreError> {
        let Self { inner, bound, .. } = self;
        let stmt = inner.as_mut().ok_or(StoreError::StatementFreed)?;
        let params = if params.is_empty() { bound.as_slice() } else { params };
        Ok((stmt, params))
    }
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Arc<[String]> {
    stmt.column_names().into_iter().map(String::from).collect()
}

fn read_row(columns: &Arc<[String]>, row: &rusqlite::Row<'_>) -> Result<Row, StoreError> {
    let values = (0..columns.len())
        .map(|i| row.get::<_, Value>(i))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Row {
        columns: Arc::clone(columns),
        values,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PlaintextEngine, StorageEngine};

    fn engine() -> (tempfile::TempDir, PlaintextEngine) {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = PlaintextEngine::new(dir.path().join("app.db"));
        engine.open().unwrap();
        engine
            .exec("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT, data BLOB);")
            .unwrap();
        (dir, engine)
    }

    #[test]
    fn test_run_reports_changes_and_rowid() {
        let (_dir, engine) = engine();
        let mut insert = engine.prepare("INSERT INTO notes (body) VALUES (?1)").unwrap();

        let first = insert.run(&["one".to_string().into()]).unwrap();
        let second = insert.run(&["two".to_string().into()]).unwrap();

        assert_eq!(first.changes, 1);
        assert_eq!(first.last_insert_id, 1);
        assert_eq!(second.last_insert_id, 2);
    }

    #[test]
    fn test_get_returns_none_for_no_match() {
        let (_dir, engine) = engine();
        let row = engine
            .prepare("SELECT body FROM notes WHERE id = ?1")
            .unwrap()
            .get(&[Value::Integer(42)])
            .unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn test_all_and_bound_params() {
        let (_dir, engine) = engine();
        engine
            .exec("INSERT INTO notes (body) VALUES ('a'), ('b'), ('c');")
            .unwrap();

        let mut stmt = engine.prepare("SELECT id, body FROM notes WHERE id >= ?1 ORDER BY id").unwrap();
        stmt.bind(&[Value::Integer(2)]).unwrap();
        let rows = stmt.all(&[]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].columns(), &["id".to_string(), "body".to_string()]);
        assert_eq!(rows[0].get_str("body"), Some("b"));
        assert_eq!(rows[1].get_i64("id"), Some(3));
        assert_eq!(rows[1].get("missing"), None);
    }

    #[test]
    fn test_free_is_idempotent_and_final() {
        let (_dir, engine) = engine();
        let mut stmt = engine.prepare("SELECT 1").unwrap();
        stmt.free();
        stmt.free();
        assert!(stmt.is_freed());
        assert!(matches!(stmt.all(&[]), Err(StoreError::StatementFreed)));
        assert!(matches!(stmt.bind(&[]), Err(StoreError::StatementFreed)));
    }

    #[test]
    fn test_row_to_json() {
        let (_dir, engine) = engine();
        engine
            .exec("INSERT INTO notes (id, body, data) VALUES (7, 'x', X'beef');")
            .unwrap();
        let row = engine
            .prepare("SELECT id, body, data FROM notes")
            .unwrap()
            .get(&[])
            .unwrap()
            .unwrap();

        let json = row.to_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["body"], "x");
        assert_eq!(json["data"], "beef");
    }

    #[test]
    fn test_prepare_invalid_sql_fails() {
        let (_dir, engine) = engine();
        assert!(matches!(
            engine.prepare("SELEC nonsense"),
            Err(StoreError::Database(_))
        ));
    }
}
