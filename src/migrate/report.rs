// Strongbox — Migration record and report

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::store::catalog::ObjectKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    RolledBack,
}

/// Transient state of one migration run. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub status: MigrationStatus,
    pub table_row_counts: BTreeMap<String, i64>,
}

impl MigrationRecord {
    pub fn new(source_path: PathBuf, target_path: PathBuf) -> Self {
        Self {
            source_path,
            target_path,
            backup_path: None,
            status: MigrationStatus::NotStarted,
            table_row_counts: BTreeMap::new(),
        }
    }
}

/// What happened to a non-table schema object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum IndexResult {
    Created,
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaObjectOutcome {
    pub name: String,
    #[serde(serialize_with = "serialize_kind")]
    pub kind: ObjectKind,
    pub result: IndexResult,
}

fn serialize_kind<S: serde::Serializer>(kind: &ObjectKind, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(kind)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub record: MigrationRecord,
    /// Where the source file was moved to.
    pub superseded_path: PathBuf,
    pub objects: Vec<SchemaObjectOutcome>,
}

impl MigrationReport {
    pub fn skipped(&self) -> impl Iterator<Item = &SchemaObjectOutcome> {
        self.objects
            .iter()
            .filter(|o| matches!(o.result, IndexResult::Skipped(_)))
    }
}

/// Result of calling [`Migrator::run`](super::Migrator::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Nothing to do: no plaintext source, or the encrypted target already exists.
    NotNeeded,
    Completed(MigrationReport),
}

impl MigrationOutcome {
    pub fn report(&self) -> Option<&MigrationReport> {
        match self {
            MigrationOutcome::Completed(report) => Some(report),
            MigrationOutcome::NotNeeded => None,
        }
    }
}
