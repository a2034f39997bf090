// Strongbox — CLI Command Handlers
//
// Each function handles one CLI subcommand. All of them go through a single
// `Adapter`, which is built, used, and closed on a blocking task because key
// derivation is deliberately slow.

use zeroize::Zeroizing;

use crate::adapter::Adapter;
use crate::config::StorePaths;
use crate::error::StrongboxError;
use crate::keys::{CredentialSource, NoHardwareToken};
use crate::migrate::IndexResult;
use crate::store::Value;

use super::{Cli, Commands};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<(), StrongboxError> {
    tokio::task::spawn_blocking(move || run(cli))
        .await
        .map_err(|e| StrongboxError::Internal(format!("command task failed: {}", e)))?
}

fn run(cli: Cli) -> Result<(), StrongboxError> {
    let paths = store_paths(&cli);
    let mut adapter = Adapter::load(paths, Box::new(NoHardwareToken))?;
    if cli.dev {
        adapter = adapter.with_development_mode(true);
    }

    let password = cli.password.map(Zeroizing::new);
    let result = match cli.command {
        Commands::Init => cmd_init(&mut adapter, password),
        Commands::Status => cmd_status(&adapter),
        Commands::Migrate => cmd_migrate(&mut adapter, password),
        Commands::ChangePassword => cmd_change_password(&mut adapter, password),
        Commands::Query { sql, params } => cmd_query(&mut adapter, password, &sql, params),
        Commands::Exec { sql } => cmd_exec(&mut adapter, password, &sql),
        Commands::ExportPlaintext { out } => cmd_export(&mut adapter, password, &out),
    };

    adapter.close()?;
    result
}

fn store_paths(cli: &Cli) -> StorePaths {
    let defaults = StorePaths::platform_default(&cli.name);
    StorePaths::new(
        cli.data_dir.clone().unwrap_or_else(|| defaults.data_dir().to_path_buf()),
        cli.config_dir.clone().unwrap_or_else(|| defaults.config_dir().to_path_buf()),
        &cli.name,
    )
}

/// Resolve the credential for commands that open the store.
///
/// An explicit password always wins. Without one, development mode and
/// plaintext-only setups proceed with no credential; everything else prompts.
fn credential(
    adapter: &Adapter,
    password: Option<Zeroizing<String>>,
) -> Result<CredentialSource, StrongboxError> {
    if let Some(password) = password {
        return Ok(CredentialSource::Password(password));
    }

    let config = adapter.config();
    let encrypted_exists = adapter.paths().encrypted_db().exists();
    if config.development_mode || (!config.enabled && !encrypted_exists) {
        return Ok(CredentialSource::None);
    }

    let entered = Zeroizing::new(rpassword::prompt_password("Store password: ")?);
    Ok(CredentialSource::Password(entered))
}

fn open(adapter: &mut Adapter, password: Option<Zeroizing<String>>) -> Result<(), StrongboxError> {
    let credential = credential(adapter, password)?;
    adapter.initialize(credential)
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

fn cmd_init(adapter: &mut Adapter, password: Option<Zeroizing<String>>) -> Result<(), StrongboxError> {
    open(adapter, password)?;
    let engine = adapter.engine()?;
    println!("✓ Store ready ({})", engine.kind());
    println!("  Path: {}", engine.path().display());

    if let Some(report) = adapter.last_migration() {
        println!(
            "✓ Migrated {} table(s) from plaintext",
            report.record.table_row_counts.len()
        );
        println!("  Superseded file: {}", report.superseded_path.display());
    }
    Ok(())
}

fn cmd_status(adapter: &Adapter) -> Result<(), StrongboxError> {
    let status = adapter.status();
    let json = serde_json::to_string_pretty(&status)
        .map_err(|e| StrongboxError::Internal(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

fn cmd_migrate(adapter: &mut Adapter, password: Option<Zeroizing<String>>) -> Result<(), StrongboxError> {
    if !adapter.paths().plaintext_db().exists() {
        println!("No plaintext store at {}", adapter.paths().plaintext_db().display());
        return Ok(());
    }

    open(adapter, password)?;
    let Some(report) = adapter.last_migration() else {
        println!("Nothing to migrate: store is already {}", adapter.engine()?.kind());
        return Ok(());
    };

    println!("✓ Migration completed");
    for (table, rows) in &report.record.table_row_counts {
        println!("  {:<32} {:>10} rows", table, rows);
    }
    for object in &report.objects {
        match &object.result {
            IndexResult::Created => println!("  {} {}: created", object.kind, object.name),
            IndexResult::Skipped(reason) => {
                println!("  {} {}: SKIPPED ({})", object.kind, object.name, reason)
            }
        }
    }
    if let Some(backup) = &report.record.backup_path {
        println!("  Backup: {}", backup.display());
    }
    println!("  Superseded file: {}", report.superseded_path.display());
    Ok(())
}

fn cmd_change_password(
    adapter: &mut Adapter,
    password: Option<Zeroizing<String>>,
) -> Result<(), StrongboxError> {
    let old = match password {
        Some(p) => p,
        None => Zeroizing::new(rpassword::prompt_password("Current password: ")?),
    };
    adapter.initialize(CredentialSource::Password(old.clone()))?;

    let new = Zeroizing::new(rpassword::prompt_password("New password: ")?);
    let confirm = Zeroizing::new(rpassword::prompt_password("Confirm new password: ")?);
    if *new != *confirm {
        println!("Passwords do not match, nothing changed");
        return Ok(());
    }

    adapter.change_password(&old, &new)?;
    println!("✓ Password changed");
    Ok(())
}

// ─── Data access ─────────────────────────────────────────────────────────────

fn cmd_query(
    adapter: &mut Adapter,
    password: Option<Zeroizing<String>>,
    sql: &str,
    params: Vec<String>,
) -> Result<(), StrongboxError> {
    open(adapter, password)?;
    let params: Vec<Value> = params.into_iter().map(Value::Text).collect();

    let mut stmt = adapter.engine()?.prepare(sql)?;
    let rows = stmt.all(&params)?;
    stmt.free();

    for row in &rows {
        println!("{}", row.to_json());
    }
    eprintln!("{} row(s)", rows.len());
    Ok(())
}

fn cmd_exec(adapter: &mut Adapter, password: Option<Zeroizing<String>>, sql: &str) -> Result<(), StrongboxError> {
    open(adapter, password)?;
    adapter.engine()?.exec(sql)?;
    println!("✓ Executed");
    Ok(())
}

fn cmd_export(
    adapter: &mut Adapter,
    password: Option<Zeroizing<String>>,
    out: &std::path::Path,
) -> Result<(), StrongboxError> {
    open(adapter, password)?;
    adapter.export_plaintext(out)?;
    println!("✓ Decrypted copy written to {}", out.display());
    println!("  This file is NOT encrypted. Delete it when you are done.");
    Ok(())
}
