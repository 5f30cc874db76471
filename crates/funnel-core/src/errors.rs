//! Errores del subsistema de export/import.
//!
//! - `StoreError`: frontera con el almacenamiento (lo que devuelve una sesión).
//! - `TransferError`: taxonomía visible hacia arriba (NotFound, Validation,
//!   Conflict, Database). Las anomalías por elemento (blob JSON corrupto, ruta
//!   colgante) no son errores: se registran con `warn!` y se omiten.

use funnel_domain::DomainError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] StoreError),
}

impl From<DomainError> for TransferError {
    fn from(err: DomainError) -> Self {
        TransferError::Validation(err.to_string())
    }
}

/// Clase de error sin payload, para resultados etiquetados y códigos de salida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Database,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::NotFound(_) => ErrorKind::NotFound,
            TransferError::Validation(_) => ErrorKind::Validation,
            TransferError::Conflict(_) => ErrorKind::Conflict,
            TransferError::Database(_) => ErrorKind::Database,
        }
    }
}
