//! Columnas JSON en la frontera de almacenamiento.
//!
//! Una columna JSON puede llegar ya como valor nativo (JSONB) o como texto
//! serializado dentro del JSON (filas escritas por clientes antiguos que
//! guardaban `json.dumps(...)`). La lectura siempre produce un valor nativo;
//! un blob corrupto se sustituye por el fallback de la columna y se registra
//! un warning, sin abortar la fila ni el export.

use log::warn;
use serde_json::{Map, Value};

/// Valor de sustitución cuando el contenido almacenado no es JSON válido.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonFallback {
    /// `shopping_cart`, `gtm_reference`, `route_config`.
    Null,
    /// `structure.data`, `cms_key.value`.
    EmptyObject,
}

impl JsonFallback {
    pub fn value(self) -> Value {
        match self {
            JsonFallback::Null => Value::Null,
            JsonFallback::EmptyObject => Value::Object(Map::new()),
        }
    }
}

/// Decodifica una columna JSON almacenada a un valor nativo.
///
/// `context` identifica la columna en el log (ej. `"step 12 shopping_cart"`).
pub fn decode_column(raw: Option<Value>, fallback: JsonFallback, context: &str) -> Value {
    match raw {
        None => Value::Null,
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("invalid JSON stored in {context}: {e}; using {:?}", fallback);
                fallback.value()
            }
        },
        Some(native) => native,
    }
}

/// Prepara un valor del snapshot para escritura: `null` se guarda como NULL.
pub fn encode_column(value: Option<&Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.clone()),
    }
}
