// Strongbox — Key error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Hardware token unavailable")]
    TokenUnavailable,

    #[error("authentication failed")]
    TokenAuthFailed,

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Key derivation error: {0}")]
    Derivation(String),

    #[error("Hardware token error: {0}")]
    Token(String),

    #[error("Key derivation task failed: {0}")]
    Task(String),
}
