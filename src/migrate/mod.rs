// Strongbox — Migration Module
//
// Verified, one-way migration of a plaintext store into an encrypted one,
// with a pre-migration backup and rollback for failed runs.

mod error;
mod migrator;
mod report;

pub use error::{MigrationError, VerificationFailure};
pub use migrator::{Migrator, PostCopyHook};
pub use report::{
    IndexResult, MigrationOutcome, MigrationRecord, MigrationReport, MigrationStatus,
    SchemaObjectOutcome,
};
