//! Filas del esquema relacional, una estructura por tabla.
//!
//! Topología del funnel (`funnel_manager`): `Workflow`, `Funnel`, `Step`,
//! `Route`. Composición de UI (`design`): `Section`, `Component`, `Structure`,
//! `StepSection`, `ComponentSection`, `StructureComponentSection`, `CmsKey`.
//! `Product` vive en un esquema externo y solo se lee.
//!
//! Las columnas JSON se guardan tal como llegan del almacenamiento
//! (`serde_json::Value`); la decodificación tolerante a blobs corruptos está en
//! [`crate::json_field`].

use serde_json::Value;

/// Identificador de fila (BIGINT en Postgres).
pub type EntityId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub id: EntityId,
    pub description: Option<String>,
}

/// Raíz del export: enlaza un `Workflow` con un producto externo.
#[derive(Debug, Clone, PartialEq)]
pub struct Funnel {
    pub id: EntityId,
    pub name: Option<String>,
    pub broker_id: Option<i64>,
    pub product_id: Option<i64>,
    pub workflow_id: Option<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub product_code: String,
    pub title_prod: Option<String>,
}

/// Página del flujo. `step_url` es único a nivel global y es la identidad
/// real del step entre bases de datos.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: EntityId,
    pub step_url: String,
    pub step_code: Option<String>,
    pub post_message: bool,
    pub shopping_cart: Option<Value>,
    pub gtm_reference: Option<Value>,
}

/// Campos mutables de un step (todo menos id y url).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepFields {
    pub step_code: Option<String>,
    pub post_message: bool,
    pub shopping_cart: Option<Value>,
    pub gtm_reference: Option<Value>,
}

impl Step {
    pub fn fields(&self) -> StepFields {
        StepFields { step_code: self.step_code.clone(),
                     post_message: self.post_message,
                     shopping_cart: self.shopping_cart.clone(),
                     gtm_reference: self.gtm_reference.clone() }
    }
}

/// Arista dirigida del workflow. `fromstep_id == None` marca la ruta de
/// entrada.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: EntityId,
    pub workflow_id: EntityId,
    pub fromstep_id: Option<EntityId>,
    pub nextstep_id: EntityId,
    pub route_config: Option<Value>,
}

impl Route {
    pub fn is_entry(&self) -> bool {
        self.fromstep_id.is_none()
    }

    pub fn touches(&self, step_id: EntityId) -> bool {
        self.nextstep_id == step_id || self.fromstep_id == Some(step_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub id: EntityId,
    pub sectiontype: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub id: EntityId,
    pub component_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub id: EntityId,
    pub data: Value,
}

/// Asociación Step ↔ Section. `productid`/`brokerid` nulos = asignación
/// compartida; con valor = limitada a ese producto/broker.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSection {
    pub id: EntityId,
    pub order: i32,
    pub sectionid: EntityId,
    pub stepid: EntityId,
    pub productid: Option<i64>,
    pub brokerid: Option<i64>,
    pub authorized: bool,
}

impl StepSection {
    /// Visible para `product_id` si es compartida o pertenece a ese producto.
    pub fn visible_for(&self, product_id: Option<i64>) -> bool {
        match self.productid {
            None => true,
            Some(p) => Some(p) == product_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSection {
    pub id: EntityId,
    pub componentid: EntityId,
    pub sectionid: EntityId,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureComponentSection {
    pub id: EntityId,
    pub component_sectionid: EntityId,
    pub structureid: EntityId,
    pub order: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmsKey {
    pub id: EntityId,
    pub value: Value,
    pub structurecomponentsectionid: EntityId,
}
