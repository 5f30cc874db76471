//! Transfer Formatter: transporte del snapshot como fichero.
//!
//! JSON con indentación de 2 espacios y UTF-8 literal (sin escapar
//! caracteres no ASCII), nombre de fichero saneado con timestamp y lectura
//! tolerante de ficheros subidos.

use std::fmt;

use chrono::NaiveDateTime;
use funnel_domain::Snapshot;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::TransferError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, TransferError> {
    serde_json::to_string_pretty(value).map_err(|e| TransferError::Validation(format!("cannot serialize funnel configuration: {e}")))
}

/// Documento compacto de error para descargas fallidas.
pub fn error_document(message: &str) -> String {
    json!({ "error": true, "message": message }).to_string()
}

/// Conserva alfanuméricos, `.`, `_`, `-` y espacio; el resto pasa a `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' ') { c } else { '_' })
        .collect()
}

/// `funnel_<nombre>_<YYYYmmdd_HHMMSS>.json`.
pub fn download_filename(name: Option<&str>, at: NaiveDateTime) -> String {
    let safe = match name {
        Some(n) if !n.is_empty() => sanitize_name(n),
        _ => "unknown_funnel".to_string(),
    };
    format!("funnel_{safe}_{}.json", at.format("%Y%m%d_%H%M%S"))
}

/// Parsea un fichero subido. Un JSON inválido es un error de validación,
/// nunca un panic.
pub fn parse_upload(bytes: &[u8]) -> Result<Value, TransferError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    serde_json::from_slice(body).map_err(|e| TransferError::Validation(format!("uploaded file is not valid JSON: {e}")))
}

/// Parsea y valida la forma de snapshot en un solo paso.
pub fn read_snapshot(bytes: &[u8]) -> Result<Snapshot, TransferError> {
    let doc = parse_upload(bytes)?;
    Ok(Snapshot::from_document(&doc)?)
}

/// Resumen previo a importar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub funnel_name: Option<String>,
    pub product_id: i64,
    pub product_code: Option<String>,
    pub product_name: Option<String>,
    pub workflow_description: Option<String>,
    pub steps: usize,
    pub routes: usize,
    pub sections: usize,
    pub components: usize,
    pub structures: usize,
    pub cms_keys: usize,
    pub exported_at: Option<String>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(s: &Snapshot) -> Self {
        let design = s.design.clone().unwrap_or_default();
        Self { funnel_name: s.funnel.name.clone(),
               product_id: s.funnel.product.id,
               product_code: s.funnel.product.code.clone(),
               product_name: s.funnel.product.name.clone(),
               workflow_description: s.workflow.description.clone(),
               steps: s.steps.len(),
               routes: s.routes.len(),
               sections: design.sections.len(),
               components: design.components.len(),
               structures: design.structures.len(),
               cms_keys: design.cms_keys.len(),
               exported_at: s.metadata.as_ref().map(|m| m.exported_at.clone()) }
    }
}

impl fmt::Display for SnapshotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dash = "-";
        writeln!(f, "Funnel:    {}", self.funnel_name.as_deref().unwrap_or(dash))?;
        writeln!(f,
                 "Product:   {} ({}, id {})",
                 self.product_name.as_deref().unwrap_or(dash),
                 self.product_code.as_deref().unwrap_or(dash),
                 self.product_id)?;
        writeln!(f, "Workflow:  {}", self.workflow_description.as_deref().unwrap_or(dash))?;
        writeln!(f, "Steps:     {}", self.steps)?;
        writeln!(f, "Routes:    {}", self.routes)?;
        write!(f,
               "Design:    {} sections, {} components, {} structures, {} cms keys",
               self.sections, self.components, self.structures, self.cms_keys)?;
        if let Some(at) = &self.exported_at {
            write!(f, "\nExported:  {at}")?;
        }
        Ok(())
    }
}
