//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y de ahí a la
//! frontera `StoreError` del core.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use funnel_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::QueryBuilderError(e) => Self::Unknown(format!("query builder: {e}")),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for StoreError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::UniqueViolation(m) => StoreError::UniqueViolation(m),
            PersistenceError::ForeignKeyViolation(m) => StoreError::ForeignKeyViolation(m),
            PersistenceError::NotFound => StoreError::NotFound,
            PersistenceError::TransientIo(m) | PersistenceError::Config(m) => StoreError::Connection(m),
            other => StoreError::Unknown(other.to_string()),
        }
    }
}

/// Atajo para `map_err` en queries Diesel.
pub(crate) fn store_err(err: DieselError) -> StoreError {
    PersistenceError::from(err).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_maps_through() {
        let err: StoreError = PersistenceError::from(DieselError::NotFound).into();
        assert_eq!(err, StoreError::NotFound);
    }

    #[test]
    fn config_errors_are_connection_errors() {
        let err: StoreError = PersistenceError::Config("DATABASE_URL is not set".into()).into();
        assert!(matches!(err, StoreError::Connection(m) if m.contains("DATABASE_URL")));
    }

    #[test]
    fn serialization_conflict_is_unknown_at_the_boundary() {
        let err: StoreError = PersistenceError::SerializationConflict.into();
        assert!(matches!(err, StoreError::Unknown(_)));
    }
}
