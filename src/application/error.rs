use thiserror::Error;

use crate::domain::{ErrorKind, LedgerError};

#[derive(Error, Debug)]
pub enum AppError {
    /// The engine refused the operation. Nothing was written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Ledger has not been initialized: run `init` first")]
    NotInitialized,

    #[error("Ledger is already initialized (owner {0})")]
    AlreadyInitialized(String),

    #[error("Stored ledger state is corrupt: {0}")]
    CorruptState(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Rejection class if this is an engine rejection.
    pub fn ledger_kind(&self) -> Option<ErrorKind> {
        match self {
            AppError::Ledger(err) => Some(err.kind()),
            _ => None,
        }
    }
}
