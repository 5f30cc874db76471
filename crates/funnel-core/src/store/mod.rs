//! Interfaz de almacenamiento consumida por exporter, importer y catálogo.
//!
//! `FunnelSession` agrupa las primitivas de lectura/escritura sobre las tablas
//! de topología y de design. `FunnelStore` entrega una sesión con adquisición
//! acotada: la sesión (y su conexión) nunca sobrevive a la llamada.

mod memory;

pub use memory::InMemoryFunnelStore;

use funnel_domain::{CmsKey, Component, ComponentSection, EntityId, Funnel, Product, Route, Section, Step, StepFields, StepSection,
                    Structure, StructureComponentSection, Workflow};
use serde_json::Value;

use crate::errors::{StoreResult, TransferError};

/// Fila nueva de `funnel_manager.funnel` (id generado por el almacenamiento).
#[derive(Debug, Clone, PartialEq)]
pub struct NewFunnel {
    pub name: Option<String>,
    pub broker_id: Option<i64>,
    pub product_id: Option<i64>,
    pub workflow_id: EntityId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStep {
    pub step_url: String,
    pub fields: StepFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRoute {
    pub workflow_id: EntityId,
    pub fromstep_id: Option<EntityId>,
    pub nextstep_id: EntityId,
    pub route_config: Option<Value>,
}

/// Tablas del esquema `design` cuyos ids se asignan por secuencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesignTable {
    Section,
    Component,
    Structure,
    StepSection,
    ComponentSection,
    StructureComponentSection,
    CmsKey,
}

impl DesignTable {
    pub const ALL: [DesignTable; 7] = [DesignTable::Section,
                                       DesignTable::Component,
                                       DesignTable::Structure,
                                       DesignTable::StepSection,
                                       DesignTable::ComponentSection,
                                       DesignTable::StructureComponentSection,
                                       DesignTable::CmsKey];

    /// Nombre calificado de la tabla.
    pub fn table_name(self) -> &'static str {
        match self {
            DesignTable::Section => "design.section",
            DesignTable::Component => "design.component",
            DesignTable::Structure => "design.structure",
            DesignTable::StepSection => "design.step_section",
            DesignTable::ComponentSection => "design.component_section",
            DesignTable::StructureComponentSection => "design.structure_component_section",
            DesignTable::CmsKey => "design.cms_key",
        }
    }
}

/// Sesión sobre el almacenamiento relacional.
///
/// Contrato común a todas las implementaciones:
/// - Las listas se devuelven ordenadas por id ascendente.
/// - `insert_step` devuelve `StoreError::UniqueViolation` si el `step_url` ya
///   existe y deja la transacción envolvente utilizable (savepoint).
/// - Los `upsert_*` insertan con el id literal o actualizan la fila con ese id.
/// - Los `delete_*` devuelven cuántas filas se borraron; no hay cascadas
///   implícitas, el orden lo decide quien llama.
pub trait FunnelSession {
    // --- topología: lecturas
    fn list_funnels(&mut self) -> StoreResult<Vec<Funnel>>;
    fn funnel_by_id(&mut self, id: EntityId) -> StoreResult<Option<Funnel>>;
    fn funnels_by_product(&mut self, product_id: i64) -> StoreResult<Vec<Funnel>>;
    fn workflow_by_id(&mut self, id: EntityId) -> StoreResult<Option<Workflow>>;
    fn product_by_id(&mut self, id: i64) -> StoreResult<Option<Product>>;
    fn step_by_id(&mut self, id: EntityId) -> StoreResult<Option<Step>>;
    fn step_by_url(&mut self, url: &str) -> StoreResult<Option<Step>>;
    fn steps_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Step>>;
    fn routes_for_workflow(&mut self, workflow_id: EntityId) -> StoreResult<Vec<Route>>;
    /// Rutas de cualquier workflow que usan el step como origen o destino.
    fn routes_for_step(&mut self, step_id: EntityId) -> StoreResult<Vec<Route>>;

    // --- topología: escrituras
    fn insert_workflow(&mut self, description: Option<&str>) -> StoreResult<EntityId>;
    fn update_workflow(&mut self, id: EntityId, description: Option<&str>) -> StoreResult<()>;
    fn insert_funnel(&mut self, funnel: &NewFunnel) -> StoreResult<EntityId>;
    /// Reescribe todas las columnas de la fila con `funnel.id`.
    fn update_funnel(&mut self, funnel: &Funnel) -> StoreResult<()>;
    fn insert_step(&mut self, step: &NewStep) -> StoreResult<EntityId>;
    fn update_step(&mut self, id: EntityId, fields: &StepFields) -> StoreResult<()>;
    fn delete_step(&mut self, id: EntityId) -> StoreResult<usize>;
    fn insert_route(&mut self, route: &NewRoute) -> StoreResult<EntityId>;
    fn delete_route(&mut self, id: EntityId) -> StoreResult<usize>;
    fn delete_routes_for_workflow(&mut self, workflow_id: EntityId) -> StoreResult<usize>;

    // --- design: lecturas
    fn step_sections_for_steps(&mut self, step_ids: &[EntityId]) -> StoreResult<Vec<StepSection>>;
    fn sections_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Section>>;
    fn components_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Component>>;
    fn component_section_by_id(&mut self, id: EntityId) -> StoreResult<Option<ComponentSection>>;
    fn component_sections_for_sections(&mut self, section_ids: &[EntityId]) -> StoreResult<Vec<ComponentSection>>;
    fn structure_link_by_id(&mut self, id: EntityId) -> StoreResult<Option<StructureComponentSection>>;
    fn structure_links_for(&mut self, component_section_ids: &[EntityId]) -> StoreResult<Vec<StructureComponentSection>>;
    /// Enlaces que apuntan a alguno de los `structure_ids`.
    fn structure_links_to(&mut self, structure_ids: &[EntityId]) -> StoreResult<Vec<StructureComponentSection>>;
    fn structures_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Structure>>;
    fn cms_keys_for(&mut self, link_ids: &[EntityId]) -> StoreResult<Vec<CmsKey>>;

    // --- design: escrituras
    /// Reserva el siguiente id de la secuencia de `table`.
    fn next_design_id(&mut self, table: DesignTable) -> StoreResult<EntityId>;
    /// Alinea las secuencias con el id máximo tras escribir ids explícitos.
    fn realign_design_ids(&mut self) -> StoreResult<()>;
    fn upsert_section(&mut self, section: &Section) -> StoreResult<()>;
    fn upsert_component(&mut self, component: &Component) -> StoreResult<()>;
    fn upsert_structure(&mut self, structure: &Structure) -> StoreResult<()>;
    fn upsert_step_section(&mut self, step_section: &StepSection) -> StoreResult<()>;
    fn upsert_component_section(&mut self, component_section: &ComponentSection) -> StoreResult<()>;
    fn upsert_structure_link(&mut self, link: &StructureComponentSection) -> StoreResult<()>;
    fn upsert_cms_key(&mut self, cms_key: &CmsKey) -> StoreResult<()>;
    fn delete_step_sections(&mut self, ids: &[EntityId]) -> StoreResult<usize>;
    fn delete_component_sections(&mut self, ids: &[EntityId]) -> StoreResult<usize>;
    fn delete_structure_links(&mut self, ids: &[EntityId]) -> StoreResult<usize>;
    fn delete_structures(&mut self, ids: &[EntityId]) -> StoreResult<usize>;
    fn delete_cms_keys_for_links(&mut self, link_ids: &[EntityId]) -> StoreResult<usize>;
}

/// Proveedor de sesiones con adquisición acotada.
pub trait FunnelStore {
    /// Ejecuta `f` con una sesión sin transacción explícita (lecturas).
    fn with_session<T, F>(&self, f: F) -> Result<T, TransferError>
        where F: FnOnce(&mut dyn FunnelSession) -> Result<T, TransferError>;

    /// Ejecuta `f` dentro de una transacción: commit si devuelve `Ok`,
    /// rollback completo si devuelve `Err`.
    fn with_transaction<T, F>(&self, f: F) -> Result<T, TransferError>
        where F: FnOnce(&mut dyn FunnelSession) -> Result<T, TransferError>;
}
