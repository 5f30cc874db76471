//! Resultado etiquetado que la fachada devuelve hacia arriba.
//!
//! Se serializa con las formas históricas de la API:
//! `{"error": false, "data": ...}` y
//! `{"error": true, "kind": "...", "message": "..."}`.

use funnel_core::{ErrorKind, TransferError};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failure { kind: ErrorKind, message: String },
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Outcome::Success(data) => Some(data),
            Outcome::Failure { .. } => None,
        }
    }

    /// Clase y mensaje del fallo, `None` si fue éxito.
    pub fn failure(&self) -> Option<(ErrorKind, &str)> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure { kind, message } => Some((*kind, message.as_str())),
        }
    }
}

impl<T> From<Result<T, TransferError>> for Outcome<T> {
    fn from(result: Result<T, TransferError>) -> Self {
        match result {
            Ok(data) => Outcome::Success(data),
            Err(err) => Outcome::Failure { kind: err.kind(),
                                           message: err.to_string() },
        }
    }
}

impl<T: Serialize> Serialize for Outcome<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Success(data) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("error", &false)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            Outcome::Failure { kind, message } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("error", &true)?;
                map.serialize_entry("kind", kind)?;
                map.serialize_entry("message", message)?;
                map.end()
            }
        }
    }
}
