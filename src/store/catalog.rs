// Strongbox — Schema Catalog
//
// Reads user-defined schema objects out of `sqlite_master`, in creation
// order, skipping SQLite's own `sqlite_*` objects and auto-indexes (which
// have no SQL and are recreated by their table definitions). Virtual tables
// and the shadow tables their modules keep data in are told apart from
// ordinary tables.

use std::collections::HashSet;

use rusqlite::Connection;

use super::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Table,
    /// `CREATE VIRTUAL TABLE`; its rows live in shadow tables, if any.
    VirtualTable,
    /// Storage table owned by a virtual table module (e.g. `notes_fts_data`).
    /// Created by replaying the virtual table, not by its own SQL.
    ShadowTable,
    Index,
    View,
    Trigger,
}

impl ObjectKind {
    /// Tables of any flavour, created before indexes, views and triggers.
    pub fn is_table(self) -> bool {
        matches!(
            self,
            ObjectKind::Table | ObjectKind::VirtualTable | ObjectKind::ShadowTable
        )
    }

    /// Tables whose rows are copied and counted during migration.
    pub fn holds_rows(self) -> bool {
        matches!(self, ObjectKind::Table | ObjectKind::ShadowTable)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::Table => "table",
            ObjectKind::VirtualTable => "virtual table",
            ObjectKind::ShadowTable => "shadow table",
            ObjectKind::Index => "index",
            ObjectKind::View => "view",
            ObjectKind::Trigger => "trigger",
        };
        f.write_str(s)
    }
}

/// A named schema object and the SQL that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub name: String,
    pub kind: ObjectKind,
    pub sql: String,
}

/// All user schema objects, tables first in the order SQLite recorded them.
pub fn schema_objects(conn: &Connection) -> Result<Vec<SchemaObject>, StoreError> {
    let shadows = shadow_tables(conn)?;

    // `_` is a LIKE wildcard; only the literal `sqlite_` prefix is reserved.
    let mut stmt = conn.prepare(
        "SELECT type, name, sql FROM sqlite_master
         WHERE name NOT LIKE 'sqlite\\_%' ESCAPE '\\' AND sql IS NOT NULL
         ORDER BY rowid",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut objects = Vec::new();
    for row in rows {
        let (raw, name, sql) = row?;
        let kind = match raw.as_str() {
            "table" if shadows.contains(&name) => ObjectKind::ShadowTable,
            "table" if is_virtual_table_sql(&sql) => ObjectKind::VirtualTable,
            "table" => ObjectKind::Table,
            "index" => ObjectKind::Index,
            "view" => ObjectKind::View,
            "trigger" => ObjectKind::Trigger,
            _ => continue,
        };
        objects.push(SchemaObject { name, kind, sql });
    }

    // Stable sort keeps creation order within tables and within the rest.
    objects.sort_by_key(|o| !o.kind.is_table());
    Ok(objects)
}

/// Names of shadow tables in the main schema, as reported by `PRAGMA table_list`.
fn shadow_tables(conn: &Connection) -> Result<HashSet<String>, StoreError> {
    let mut stmt = conn.prepare("PRAGMA main.table_list")?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
    })?;

    let mut shadows = HashSet::new();
    for row in rows {
        let (name, kind) = row?;
        if kind == "shadow" {
            shadows.insert(name);
        }
    }
    Ok(shadows)
}

fn is_virtual_table_sql(sql: &str) -> bool {
    let mut words = sql.split_whitespace().map(|w| w.to_ascii_uppercase());
    matches!(
        (words.next().as_deref(), words.next().as_deref(), words.next().as_deref()),
        (Some("CREATE"), Some("VIRTUAL"), Some("TABLE"))
    )
}

/// AUTOINCREMENT counters from `sqlite_sequence`, empty when no table uses one.
pub fn autoincrement_counters(conn: &Connection) -> Result<Vec<(String, i64)>, StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT name, seq FROM sqlite_sequence")?;
    let counters = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(counters)
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, StoreError> {
    let count = conn.query_row(
        &format!("SELECT count(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Double-quote an identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE a (id INTEGER PRIMARY KEY, name TEXT UNIQUE);
             CREATE INDEX idx_a_name ON a(name);
             CREATE TABLE b (id INTEGER, a_id INTEGER);
             CREATE VIEW v_a AS SELECT name FROM a;
             CREATE TRIGGER trg_b AFTER INSERT ON b BEGIN SELECT 1; END;
             INSERT INTO a (name) VALUES ('x'), ('y');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_schema_objects_excludes_internal() {
        let objects = schema_objects(&conn()).unwrap();
        let names: Vec<&str> = objects.iter().map(|o| o.name.as_str()).collect();

        assert_eq!(names, vec!["a", "b", "idx_a_name", "v_a", "trg_b"]);
        assert!(
            !names.iter().any(|n| n.starts_with("sqlite_")),
            "Auto-indexes must not be listed"
        );
    }

    #[test]
    fn test_kinds_are_classified() {
        let objects = schema_objects(&conn()).unwrap();
        let kind_of = |n: &str| objects.iter().find(|o| o.name == n).unwrap().kind;
        assert_eq!(kind_of("a"), ObjectKind::Table);
        assert_eq!(kind_of("idx_a_name"), ObjectKind::Index);
        assert_eq!(kind_of("v_a"), ObjectKind::View);
        assert_eq!(kind_of("trg_b"), ObjectKind::Trigger);
    }

    #[test]
    fn test_columns_and_counts() {
        let conn = conn();
        assert_eq!(table_columns(&conn, "a").unwrap(), vec!["id", "name"]);
        assert_eq!(count_rows(&conn, "a").unwrap(), 2);
        assert_eq!(count_rows(&conn, "b").unwrap(), 0);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quoted_table_names_work() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE \"order items\" (x INTEGER); INSERT INTO \"order items\" VALUES (1);")
            .unwrap();
        assert_eq!(count_rows(&conn, "order items").unwrap(), 1);
    }

    #[test]
    fn test_tables_named_like_sqlite_are_listed() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE sqlitestats (n INTEGER);
             CREATE TABLE sqlite1 (n INTEGER);
             CREATE TABLE counted (id INTEGER PRIMARY KEY AUTOINCREMENT);",
        )
        .unwrap();

        let names: Vec<String> = schema_objects(&conn).unwrap().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["sqlitestats", "sqlite1", "counted"]);
    }

    #[test]
    fn test_fts_tables_are_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
             CREATE VIRTUAL TABLE notes_fts USING fts5(body);",
        )
        .unwrap();

        let objects = schema_objects(&conn).unwrap();
        let kind_of = |n: &str| objects.iter().find(|o| o.name == n).unwrap().kind;
        assert_eq!(kind_of("notes"), ObjectKind::Table);
        assert_eq!(kind_of("notes_fts"), ObjectKind::VirtualTable);
        assert_eq!(kind_of("notes_fts_data"), ObjectKind::ShadowTable);
        assert_eq!(kind_of("notes_fts_config"), ObjectKind::ShadowTable);
        assert!(objects.iter().all(|o| o.kind.is_table()));
    }

    #[test]
    fn test_autoincrement_counters() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(autoincrement_counters(&conn).unwrap().is_empty());

        conn.execute_batch(
            "CREATE TABLE jobs (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
             INSERT INTO jobs (name) VALUES ('a'), ('b'), ('c');
             DELETE FROM jobs WHERE id = 3;",
        )
        .unwrap();
        assert_eq!(autoincrement_counters(&conn).unwrap(), vec![("jobs".to_string(), 3)]);
    }
}
