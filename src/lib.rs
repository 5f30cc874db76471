//! Funnel Manager
//!
//! Export/import de la configuración completa de un funnel (workflow, steps,
//! rutas y design) como un único documento JSON portable.
//!
//! - `api`: fachada que devuelve resultados etiquetados (`Outcome`).
//! - `outcome`: forma serializada de éxito/fallo.
//! - `errors`: errores del binario y códigos de salida.
//!
//! El núcleo vive en `funnel-core`; Postgres en `funnel-persistence`.

pub mod api;
pub mod errors;
pub mod outcome;

pub use api::{export_filename, export_funnel_config, format_export_for_download, import_funnel_config};
pub use errors::AppError;
pub use outcome::Outcome;
