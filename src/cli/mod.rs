// Strongbox — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: init, status, migrate, change-password, query, exec,
// export-plaintext.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::execute;

/// Strongbox — encrypted local storage with one-way plaintext migration.
#[derive(Parser, Debug)]
#[command(name = "strongbox")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the database files (default: platform data dir).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Directory holding encryption-config.json and key-metadata.json
    /// (default: platform config dir).
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Logical store name; files are `<name>.db` / `<name>.encrypted.db`.
    #[arg(long, global = true, default_value = "strongbox")]
    pub name: String,

    /// Development mode: no password means no encryption for new stores.
    #[arg(long, global = true)]
    pub dev: bool,

    /// Store password. Prefer the environment variable or the prompt to keep
    /// it out of shell history.
    #[arg(long, global = true, env = "STRONGBOX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open (creating or migrating as needed) the store and report what happened.
    Init,

    /// Show engine selection, file presence, and key metadata. Never prompts.
    Status,

    /// Migrate an existing plaintext store into an encrypted one.
    Migrate,

    /// Re-encrypt the store under a new password.
    ChangePassword,

    /// Run a query and print each row as a JSON object.
    Query {
        /// SQL text. Use `?1`, `?2`, ... with --param for values.
        sql: String,

        /// Positional parameter values (bound as text).
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Execute one or more statements with no results.
    Exec {
        sql: String,
    },

    /// Write a decrypted copy of the encrypted store.
    ExportPlaintext {
        /// Destination path. Must not exist.
        #[arg(long)]
        out: PathBuf,
    },
}
