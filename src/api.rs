//! Fachada hacia la capa de presentación: export, import y formato de
//! descarga sobre cualquier `FunnelStore`.

use chrono::{Local, NaiveDateTime};
use funnel_core::transfer::{download_filename, error_document, to_pretty_json};
use funnel_core::{export_funnel, import_document, FunnelStore, ImportReport};
use funnel_domain::{EntityId, Snapshot};
use serde_json::Value;

use crate::outcome::Outcome;

pub fn export_funnel_config<S: FunnelStore>(store: &S, funnel_id: EntityId) -> Outcome<Snapshot> {
    export_funnel(store, funnel_id).into()
}

/// Valida e importa un documento ya parseado. Todo o nada: un fallo no deja
/// filas escritas.
pub fn import_funnel_config<S: FunnelStore>(store: &S, document: &Value, update_existing: bool) -> Outcome<ImportReport> {
    import_document(store, document, update_existing).into()
}

/// JSON indentado del snapshot, o `{"error":true,"message":...}` si el export
/// falló.
pub fn format_export_for_download(outcome: &Outcome<Snapshot>) -> String {
    match outcome {
        Outcome::Success(snapshot) => match to_pretty_json(snapshot) {
            Ok(text) => text,
            Err(err) => error_document(&err.to_string()),
        },
        Outcome::Failure { message, .. } => error_document(message),
    }
}

/// Nombre de archivo de descarga para un export exitoso.
pub fn export_filename(snapshot: &Snapshot) -> String {
    export_filename_at(snapshot, Local::now().naive_local())
}

pub fn export_filename_at(snapshot: &Snapshot, at: NaiveDateTime) -> String {
    download_filename(snapshot.funnel.name.as_deref(), at)
}
