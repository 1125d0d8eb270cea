//! Error types for Pharmadesk

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SharedError {
    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),
}
