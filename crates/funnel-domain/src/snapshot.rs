//! Documento portable de un funnel (snapshot).
//!
//! Forma en el cable:
//! `funnel{id,name,broker_id,product{id,code,name}}`, `workflow{id,description}`,
//! `steps[]`, `routes[]`, `design{sections,components,structures,cms_keys}`,
//! `metadata{exported_at,version,includes_design}`.
//!
//! Los ids del snapshot son los de la base de origen. Los de step no son
//! portables (se reconcilian por `step_url`); los de design se asumen estables
//! dentro del mismo despliegue.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::entities::EntityId;
use crate::error::DomainError;

/// Versión del formato emitida en `metadata.version`.
pub const SNAPSHOT_VERSION: &str = "1.1";

/// Claves de primer nivel obligatorias para importar.
const REQUIRED_KEYS: [&str; 4] = ["funnel", "workflow", "steps", "routes"];

/// `null` o ausente se leen como `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where D: Deserializer<'de>,
          T: Default + Deserialize<'de>
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub funnel: FunnelSnapshot,
    pub workflow: WorkflowSnapshot,
    pub steps: Vec<StepSnapshot>,
    pub routes: Vec<RouteSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design: Option<DesignSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SnapshotMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelSnapshot {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub broker_id: Option<i64>,
    pub product: ProductSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub id: EntityId,
    pub step_url: String,
    #[serde(default)]
    pub step_code: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub post_message: bool,
    #[serde(default)]
    pub shopping_cart: Option<Value>,
    #[serde(default)]
    pub gtm_reference: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    #[serde(default)]
    pub id: Option<EntityId>,
    #[serde(default)]
    pub fromstep_id: Option<EntityId>,
    #[serde(default)]
    pub nextstep_id: Option<EntityId>,
    #[serde(default)]
    pub route_config: Option<Value>,
    #[serde(default)]
    pub from_step_url: Option<String>,
    #[serde(default)]
    pub to_step_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesignSnapshot {
    #[serde(default)]
    pub sections: Vec<SectionItem>,
    #[serde(default)]
    pub components: Vec<ComponentItem>,
    #[serde(default)]
    pub structures: Vec<StructureItem>,
    #[serde(default)]
    pub cms_keys: Vec<CmsKeyItem>,
}

impl DesignSnapshot {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty() && self.components.is_empty() && self.structures.is_empty() && self.cms_keys.is_empty()
    }
}

/// Section más los campos de su fila `step_section`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionItem {
    pub id: EntityId,
    pub sectiontype: String,
    #[serde(default)]
    pub step_section_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order: i32,
    #[serde(default)]
    pub stepid: Option<EntityId>,
    #[serde(default)]
    pub productid: Option<i64>,
    #[serde(default)]
    pub brokerid: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub authorized: bool,
}

/// Component más los campos de su fila `component_section`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentItem {
    pub id: EntityId,
    pub component_type: String,
    #[serde(default)]
    pub component_section_id: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order: i32,
    #[serde(default)]
    pub sectionid: Option<EntityId>,
}

/// Structure más los campos de su fila `structure_component_section`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureItem {
    pub id: EntityId,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub structure_component_section_id: Option<EntityId>,
    #[serde(default)]
    pub component_sectionid: Option<EntityId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CmsKeyItem {
    pub id: EntityId,
    #[serde(default)]
    pub value: Value,
    pub structurecomponentsectionid: EntityId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub includes_design: bool,
}

impl Snapshot {
    /// Valida y tipa un documento JSON subido.
    ///
    /// Comprueba primero las claves obligatorias (`funnel`, `workflow`,
    /// `steps`, `routes`) para dar un error legible antes de cualquier
    /// deserialización; luego delega en serde.
    pub fn from_document(doc: &Value) -> Result<Self, DomainError> {
        let obj = doc.as_object()
                     .ok_or_else(|| DomainError::ValidationError("funnel configuration must be a JSON object".to_string()))?;
        for key in REQUIRED_KEYS {
            if !obj.contains_key(key) {
                return Err(DomainError::MissingField(key));
            }
        }
        let has_product_id = obj.get("funnel")
                                .and_then(|f| f.get("product"))
                                .and_then(|p| p.get("id"))
                                .is_some_and(|id| !id.is_null());
        if !has_product_id {
            return Err(DomainError::MissingField("funnel.product.id"));
        }
        serde_json::from_value(doc.clone()).map_err(|e| DomainError::ValidationError(format!("invalid funnel configuration: {e}")))
    }

    /// `true` si el snapshot trae una sección `design` con al menos un elemento.
    pub fn has_design(&self) -> bool {
        self.design.as_ref().is_some_and(|d| !d.is_empty())
    }
}
