//! Errores del binario y su código de salida.

use std::path::PathBuf;

use funnel_core::{ErrorKind, TransferError};
use funnel_persistence::PersistenceError;
use thiserror::Error;

pub const EXIT_INVALID_INPUT: i32 = 3;
pub const EXIT_NOT_FOUND_OR_CONFLICT: i32 = 4;
pub const EXIT_DATABASE: i32 = 5;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{message}")]
    Transfer { kind: ErrorKind, message: String },
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io { path: path.into(),
                       source }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Io { .. } => EXIT_INVALID_INPUT,
            AppError::Transfer { kind, .. } => match kind {
                ErrorKind::Validation => EXIT_INVALID_INPUT,
                ErrorKind::NotFound | ErrorKind::Conflict => EXIT_NOT_FOUND_OR_CONFLICT,
                ErrorKind::Database => EXIT_DATABASE,
            },
            AppError::Config(_) => EXIT_DATABASE,
        }
    }
}

impl From<TransferError> for AppError {
    fn from(err: TransferError) -> Self {
        AppError::Transfer { kind: err.kind(),
                             message: err.to_string() }
    }
}

impl From<PersistenceError> for AppError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Config(m) => AppError::Config(m),
            other => AppError::Transfer { kind: ErrorKind::Database,
                                          message: other.to_string() },
        }
    }
}
