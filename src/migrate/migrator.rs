// Strongbox — Plaintext → Encrypted Migrator
//
// One-shot copy of an existing plaintext store into a new encrypted file:
//
//   1. needs_migration(): source exists and target does not, else no-op
//   2. open source read-only, take a timestamped backup through SQLite
//   3. read the source schema catalog
//   4. create target, replay every table and virtual table verbatim
//   5. copy rows, one transaction per table, then AUTOINCREMENT counters
//   6. replay indexes, views, triggers (failures skipped and reported)
//   7. verify per-table row counts and the target's integrity
//   8. close both handles, rename source and its sidecars to `<source>.old`
//
// The source is opened read-only and only renamed as the very last step, so
// every failure before that leaves it untouched. A failed run deletes the
// half-written target.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, DatabaseName};

use super::error::{MigrationError, VerificationFailure};
use super::report::{
    IndexResult, MigrationOutcome, MigrationRecord, MigrationReport, MigrationStatus,
    SchemaObjectOutcome,
};
use crate::config::StorePaths;
use crate::keys::DatabaseKey;
use crate::store::catalog::{self, ObjectKind, SchemaObject};
use crate::store::{EncryptedEngine, PlaintextEngine, StorageEngine};

/// SQLite sidecar suffixes that belong to a database file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Runs against the target connection after rows are copied and before
/// verification, so anything it changes is held to the row-count check.
pub type PostCopyHook = Box<dyn FnMut(&Connection) -> rusqlite::Result<()> + Send>;

pub struct Migrator {
    key: DatabaseKey,
    record: MigrationRecord,
    post_copy: Option<PostCopyHook>,
}

impl Migrator {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>, key: &DatabaseKey) -> Self {
        Self {
            key: key.clone(),
            record: MigrationRecord::new(source.into(), target.into()),
            post_copy: None,
        }
    }

    /// Install a fix-up step that runs on the target once all rows are in.
    pub fn with_post_copy(
        mut self,
        hook: impl FnMut(&Connection) -> rusqlite::Result<()> + Send + 'static,
    ) -> Self {
        self.post_copy = Some(Box::new(hook));
        self
    }

    pub fn record(&self) -> &MigrationRecord {
        &self.record
    }

    pub fn source(&self) -> &Path {
        &self.record.source_path
    }

    pub fn target(&self) -> &Path {
        &self.record.target_path
    }

    /// True only when the plaintext source exists and the encrypted target does not.
    pub fn needs_migration(&self) -> bool {
        self.source().exists() && !self.target().exists()
    }

    /// Run the migration. Returns `NotNeeded` without touching the
    /// filesystem when there is nothing to migrate.
    pub fn run(&mut self) -> Result<MigrationOutcome, MigrationError> {
        if !self.needs_migration() {
            tracing::debug!(
                source = %self.source().display(),
                target = %self.target().display(),
                "No migration needed"
            );
            return Ok(MigrationOutcome::NotNeeded);
        }

        self.record.status = MigrationStatus::InProgress;
        self.record.table_row_counts.clear();
        tracing::info!(
            source = %self.source().display(),
            target = %self.target().display(),
            "Starting plaintext to encrypted migration"
        );

        match self.migrate() {
            Ok(report) => {
                self.record.status = MigrationStatus::Completed;
                let report = MigrationReport {
                    record: self.record.clone(),
                    ..report
                };
                tracing::info!(
                    tables = report.record.table_row_counts.len(),
                    skipped = report.skipped().count(),
                    superseded = %report.superseded_path.display(),
                    "Migration completed"
                );
                Ok(MigrationOutcome::Completed(report))
            }
            Err(e) => {
                self.record.status = MigrationStatus::Failed;
                tracing::error!(error = %e, "Migration failed, removing partial target");
                if let Err(cleanup) = remove_db_file(self.target()) {
                    tracing::error!(
                        error = %cleanup,
                        target = %self.target().display(),
                        "Failed to remove partial target"
                    );
                }
                Err(e)
            }
        }
    }

    /// Undo a failed or interrupted run: delete the target and, if the
    /// source is gone, restore it from the backup. Not possible once the run
    /// has completed.
    pub fn rollback(&mut self) -> Result<(), MigrationError> {
        match self.record.status {
            MigrationStatus::Completed => return Err(MigrationError::RollbackUnavailable),
            MigrationStatus::NotStarted | MigrationStatus::RolledBack => return Ok(()),
            MigrationStatus::InProgress | MigrationStatus::Failed => {}
        }

        remove_db_file(self.target())?;

        if let Some(backup) = &self.record.backup_path {
            if backup.exists() && !self.record.source_path.exists() {
                std::fs::copy(backup, &self.record.source_path)?;
                tracing::info!(
                    backup = %backup.display(),
                    source = %self.record.source_path.display(),
                    "Source restored from backup"
                );
            }
        }

        self.record.status = MigrationStatus::RolledBack;
        Ok(())
    }

    fn migrate(&mut self) -> Result<MigrationReport, MigrationError> {
        let source_path = self.record.source_path.clone();
        let target_path = self.record.target_path.clone();

        let superseded = StorePaths::superseded_for(&source_path);
        if let Some(existing) = with_sidecars(&superseded).into_iter().find(|p| p.exists()) {
            return Err(MigrationError::SupersededExists(existing));
        }

        // 2. Source and backup. The backup API reads through SQLite, so rows
        // still sitting in a WAL end up in the backup too.
        let mut source = PlaintextEngine::read_only(&source_path);
        source.open()?;
        let backup = StorePaths::backup_for(&source_path, Utc::now().timestamp_millis());
        source.connection()?.backup(DatabaseName::Main, &backup, None)?;
        self.record.backup_path = Some(backup.clone());
        tracing::info!(backup = %backup.display(), "Source backed up");

        // 3. Source catalog
        let objects = catalog::schema_objects(source.connection()?)?;
        let (tables, secondary): (Vec<SchemaObject>, Vec<SchemaObject>) =
            objects.into_iter().partition(|o| o.kind.is_table());

        // 4. Target schema. Shadow tables come into being with their virtual table.
        let mut target = EncryptedEngine::new(&target_path, self.key.clone());
        target.open()?;
        target.exec("PRAGMA foreign_keys = OFF;")?;
        for table in tables.iter().filter(|t| t.kind != ObjectKind::ShadowTable) {
            target.exec(&table.sql)?;
        }

        // 5. Data
        for table in tables.iter().filter(|t| t.kind.holds_rows()) {
            let replace = table.kind == ObjectKind::ShadowTable;
            let copied = copy_table(source.connection()?, target.connection()?, &table.name, replace)?;
            tracing::debug!(table = %table.name, rows = copied, "Copied table");
        }
        let counters = carry_counters(source.connection()?, target.connection()?, &tables)?;
        if counters > 0 {
            tracing::debug!(tables = counters, "Carried AUTOINCREMENT counters");
        }
        if tables.iter().any(|t| t.kind == ObjectKind::VirtualTable) {
            // Virtual table modules cache state per connection; reload it
            // from the copied shadow tables.
            target.close()?;
            target.open()?;
        }

        if let Some(hook) = self.post_copy.as_mut() {
            hook(target.connection()?)?;
        }

        // 6. Indexes, views, triggers
        let outcomes = secondary
            .iter()
            .map(|object| replay_object(&target, object))
            .collect::<Vec<_>>();

        // 7. Verification
        for table in tables.iter().filter(|t| t.kind.holds_rows()) {
            let source_rows = catalog::count_rows(source.connection()?, &table.name)?;
            let target_rows = catalog::count_rows(target.connection()?, &table.name)?;
            if source_rows != target_rows {
                return Err(MigrationError::VerificationFailed(VerificationFailure::RowCount {
                    table: table.name.clone(),
                    source_rows,
                    target_rows,
                }));
            }
            self.record
                .table_row_counts
                .insert(table.name.clone(), source_rows);
        }
        target.integrity_check().map_err(|e| {
            MigrationError::VerificationFailed(VerificationFailure::Integrity(e.to_string()))
        })?;

        // 8. Swap
        target.close()?;
        source.close()?;
        supersede(&source_path, &superseded)?;
        tracing::info!(superseded = %superseded.display(), "Plaintext source superseded");

        Ok(MigrationReport {
            record: self.record.clone(),
            superseded_path: superseded,
            objects: outcomes,
        })
    }
}

/// Copy every row of `table` inside a single target transaction. With
/// `replace`, rows the target already holds are dropped first.
fn copy_table(
    source: &Connection,
    target: &Connection,
    table: &str,
    replace: bool,
) -> Result<u64, MigrationError> {
    let columns = catalog::table_columns(source, table)?;
    let column_list = columns
        .iter()
        .map(|c| catalog::quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let quoted_table = catalog::quote_ident(table);

    let tx = target.unchecked_transaction()?;
    if replace {
        tx.execute(&format!("DELETE FROM {}", quoted_table), [])?;
    }
    let mut copied = 0u64;
    {
        let mut read = source.prepare(&format!("SELECT {} FROM {}", column_list, quoted_table))?;
        let mut write = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quoted_table, column_list, placeholders
        ))?;

        let mut rows = read.query([])?;
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            write.execute(params_from_iter(values.iter()))?;
            copied += 1;
        }
    }
    tx.commit()?;
    Ok(copied)
}

/// Bring the target's `sqlite_sequence` in line with the source so ids
/// handed out before migration are never reused.
fn carry_counters(
    source: &Connection,
    target: &Connection,
    tables: &[SchemaObject],
) -> Result<usize, MigrationError> {
    let counters = catalog::autoincrement_counters(source)?
        .into_iter()
        .filter(|(name, _)| tables.iter().any(|t| t.kind == ObjectKind::Table && t.name == *name))
        .collect::<Vec<_>>();
    if counters.is_empty() {
        return Ok(0);
    }

    let tx = target.unchecked_transaction()?;
    for (table, seq) in &counters {
        let updated = tx.execute(
            "UPDATE sqlite_sequence SET seq = ?2 WHERE name = ?1",
            params![table, seq],
        )?;
        if updated == 0 {
            tx.execute(
                "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
                params![table, seq],
            )?;
        }
    }
    tx.commit()?;
    Ok(counters.len())
}

/// Replay an index, view, or trigger. Failures are skipped, not fatal.
fn replay_object(target: &EncryptedEngine, object: &SchemaObject) -> SchemaObjectOutcome {
    let result = match target.exec(&object.sql) {
        Ok(()) => IndexResult::Created,
        Err(e) => {
            tracing::warn!(
                name = %object.name,
                kind = %object.kind,
                error = %e,
                "Skipping schema object during migration"
            );
            IndexResult::Skipped(e.to_string())
        }
    };
    SchemaObjectOutcome {
        name: object.name.clone(),
        kind: object.kind,
        result,
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// The database file followed by its journal sidecars.
fn with_sidecars(path: &Path) -> Vec<PathBuf> {
    std::iter::once(path.to_path_buf())
        .chain(SIDECAR_SUFFIXES.iter().map(|s| sidecar(path, s)))
        .collect()
}

/// Rename the source and any sidecars to the superseded name. Sidecars go
/// first and are moved back if the main file cannot follow.
fn supersede(source: &Path, superseded: &Path) -> std::io::Result<()> {
    let mut moved = Vec::new();
    let mut result = Ok(());
    for suffix in SIDECAR_SUFFIXES {
        let from = sidecar(source, suffix);
        if !from.exists() {
            continue;
        }
        let to = sidecar(superseded, suffix);
        if let Err(e) = std::fs::rename(&from, &to) {
            result = Err(e);
            break;
        }
        moved.push((from, to));
    }
    if result.is_ok() {
        result = std::fs::rename(source, superseded);
    }

    if result.is_err() {
        for (from, to) in moved.iter().rev() {
            if let Err(e) = std::fs::rename(to, from) {
                tracing::error!(error = %e, path = %to.display(), "Failed to restore sidecar");
            }
        }
    }
    result
}

/// Remove a database file and its journal sidecars, ignoring absent ones.
fn remove_db_file(path: &Path) -> std::io::Result<()> {
    for candidate in with_sidecars(path) {
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
