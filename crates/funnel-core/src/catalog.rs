//! Accesores de entidad individuales con las invariantes de ciclo de vida.
//!
//! Cada operación abre su propia transacción. Las violaciones de invariantes
//! (URL duplicada, ruta duplicada, step referenciado) se devuelven como
//! `Conflict`; las referencias a filas inexistentes como `NotFound`.

use std::collections::HashSet;

use funnel_domain::{CmsKey, Component, ComponentSection, EntityId, Funnel, Section, StepFields, StepSection, Structure,
                    StructureComponentSection};
use log::{debug, info};
use serde_json::{json, Value};

use crate::errors::{StoreError, TransferError};
use crate::store::{DesignTable, FunnelSession, FunnelStore, NewRoute, NewStep};

/// Campos de la fila `step_section` al asignar una sección a un step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionPlacement {
    pub order: i32,
    pub productid: Option<i64>,
    pub brokerid: Option<i64>,
    pub authorized: bool,
}

/// Filas creadas por [`attach_component_to_section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentAttachment {
    pub component_section_id: EntityId,
    pub structure_id: EntityId,
    pub structure_link_id: EntityId,
}

fn not_found(what: &str, id: EntityId) -> TransferError {
    TransferError::NotFound(format!("{what} {id} not found"))
}

fn require_step(session: &mut dyn FunnelSession, id: EntityId) -> Result<(), TransferError> {
    session.step_by_id(id)?.map(|_| ()).ok_or_else(|| not_found("step", id))
}

fn require_section(session: &mut dyn FunnelSession, id: EntityId) -> Result<Section, TransferError> {
    session.sections_by_ids(&[id])?.into_iter().next().ok_or_else(|| not_found("section", id))
}

pub fn list_funnels<S: FunnelStore>(store: &S) -> Result<Vec<Funnel>, TransferError> {
    store.with_session(|session| Ok(session.list_funnels()?))
}

pub fn create_step<S: FunnelStore>(store: &S, step_url: &str, fields: StepFields) -> Result<EntityId, TransferError> {
    if step_url.trim().is_empty() {
        return Err(TransferError::Validation("step_url must not be empty".to_string()));
    }
    let id = store.with_transaction(|session| {
                      if session.step_by_url(step_url)?.is_some() {
                          return Err(TransferError::Conflict(format!("step_url '{step_url}' already exists")));
                      }
                      session.insert_step(&NewStep { step_url: step_url.to_string(),
                                                     fields })
                             .map_err(|e| match e {
                                 StoreError::UniqueViolation(_) => {
                                     TransferError::Conflict(format!("step_url '{step_url}' already exists"))
                                 }
                                 other => other.into(),
                             })
                  })?;
    info!("step {id} created for '{step_url}'");
    Ok(id)
}

pub fn update_step<S: FunnelStore>(store: &S, id: EntityId, fields: &StepFields) -> Result<(), TransferError> {
    store.with_transaction(|session| {
             require_step(session, id)?;
             Ok(session.update_step(id, fields)?)
         })
}

/// Borra un step sin rutas que lo referencien.
pub fn delete_step<S: FunnelStore>(store: &S, id: EntityId) -> Result<(), TransferError> {
    store.with_transaction(|session| {
             require_step(session, id)?;
             let routes = session.routes_for_step(id)?;
             if !routes.is_empty() {
                 return Err(TransferError::Conflict(format!("step {id} is used by {} route(s); delete them first", routes.len())));
             }
             session.delete_step(id)?;
             info!("step {id} deleted");
             Ok(())
         })
}

/// Crea una ruta; rechaza extremos inexistentes y la terna
/// `(workflow, from, next)` repetida.
pub fn create_route<S: FunnelStore>(store: &S, route: &NewRoute) -> Result<EntityId, TransferError> {
    store.with_transaction(|session| {
             if session.workflow_by_id(route.workflow_id)?.is_none() {
                 return Err(not_found("workflow", route.workflow_id));
             }
             if let Some(from) = route.fromstep_id {
                 require_step(session, from)?;
             }
             require_step(session, route.nextstep_id)?;
             let duplicate = session.routes_for_workflow(route.workflow_id)?
                                    .iter()
                                    .any(|r| r.fromstep_id == route.fromstep_id && r.nextstep_id == route.nextstep_id);
             if duplicate {
                 return Err(TransferError::Conflict(format!("route {:?} -> {} already exists in workflow {}",
                                                            route.fromstep_id, route.nextstep_id, route.workflow_id)));
             }
             let id = session.insert_route(route)?;
             debug!("route {id} created in workflow {}", route.workflow_id);
             Ok(id)
         })
}

pub fn delete_route<S: FunnelStore>(store: &S, id: EntityId) -> Result<(), TransferError> {
    store.with_transaction(|session| match session.delete_route(id)? {
             0 => Err(not_found("route", id)),
             _ => Ok(()),
         })
}

pub fn create_section<S: FunnelStore>(store: &S, sectiontype: &str) -> Result<EntityId, TransferError> {
    store.with_transaction(|session| {
             let id = session.next_design_id(DesignTable::Section)?;
             session.upsert_section(&Section { id,
                                               sectiontype: sectiontype.to_string() })?;
             Ok(id)
         })
}

pub fn create_component<S: FunnelStore>(store: &S, component_type: &str) -> Result<EntityId, TransferError> {
    store.with_transaction(|session| {
             let id = session.next_design_id(DesignTable::Component)?;
             session.upsert_component(&Component { id,
                                                   component_type: component_type.to_string() })?;
             Ok(id)
         })
}

pub fn attach_section_to_step<S: FunnelStore>(store: &S,
                                              step_id: EntityId,
                                              section_id: EntityId,
                                              placement: SectionPlacement)
                                              -> Result<EntityId, TransferError> {
    store.with_transaction(|session| {
             require_step(session, step_id)?;
             require_section(session, section_id)?;
             let id = session.next_design_id(DesignTable::StepSection)?;
             session.upsert_step_section(&StepSection { id,
                                                        order: placement.order,
                                                        sectionid: section_id,
                                                        stepid: step_id,
                                                        productid: placement.productid,
                                                        brokerid: placement.brokerid,
                                                        authorized: placement.authorized })?;
             Ok(id)
         })
}

/// Enlaza un componente a una sección junto con su Structure vacía (`{}`)
/// y la fila StructureComponentSection que los une.
pub fn attach_component_to_section<S: FunnelStore>(store: &S,
                                                   component_id: EntityId,
                                                   section_id: EntityId,
                                                   order: i32)
                                                   -> Result<ComponentAttachment, TransferError> {
    store.with_transaction(|session| {
             require_section(session, section_id)?;
             if session.components_by_ids(&[component_id])?.is_empty() {
                 return Err(not_found("component", component_id));
             }
             let already = session.component_sections_for_sections(&[section_id])?
                                  .iter()
                                  .any(|cs| cs.componentid == component_id);
             if already {
                 return Err(TransferError::Conflict(format!("component {component_id} is already attached to section {section_id}")));
             }

             let component_section_id = session.next_design_id(DesignTable::ComponentSection)?;
             session.upsert_component_section(&ComponentSection { id: component_section_id,
                                                                  componentid: component_id,
                                                                  sectionid: section_id,
                                                                  order })?;
             let structure_id = session.next_design_id(DesignTable::Structure)?;
             session.upsert_structure(&Structure { id: structure_id, data: json!({}) })?;
             let structure_link_id = session.next_design_id(DesignTable::StructureComponentSection)?;
             session.upsert_structure_link(&StructureComponentSection { id: structure_link_id,
                                                                        component_sectionid: component_section_id,
                                                                        structureid: structure_id,
                                                                        order: 0 })?;
             debug!("component {component_id} attached to section {section_id} (component_section {component_section_id})");
             Ok(ComponentAttachment { component_section_id,
                                      structure_id,
                                      structure_link_id })
         })
}

/// Quita un ComponentSection en cascada explícita:
/// CmsKey → StructureComponentSection → Structure → ComponentSection.
///
/// Una Structure que otro enlace sigue usando se conserva.
pub fn detach_component<S: FunnelStore>(store: &S, component_section_id: EntityId) -> Result<(), TransferError> {
    store.with_transaction(|session| {
             if session.component_section_by_id(component_section_id)?.is_none() {
                 return Err(not_found("component_section", component_section_id));
             }
             let links = session.structure_links_for(&[component_section_id])?;
             let link_ids: Vec<EntityId> = links.iter().map(|l| l.id).collect();
             let mut structure_ids: Vec<EntityId> = links.iter().map(|l| l.structureid).collect();
             structure_ids.sort_unstable();
             structure_ids.dedup();
             session.delete_cms_keys_for_links(&link_ids)?;
             session.delete_structure_links(&link_ids)?;
             let shared: HashSet<EntityId> = session.structure_links_to(&structure_ids)?
                                                    .into_iter()
                                                    .map(|l| l.structureid)
                                                    .collect();
             if !shared.is_empty() {
                 debug!("keeping structures {shared:?} still linked elsewhere");
             }
             structure_ids.retain(|id| !shared.contains(id));
             session.delete_structures(&structure_ids)?;
             session.delete_component_sections(&[component_section_id])?;
             info!("component_section {component_section_id} detached");
             Ok(())
         })
}

/// Crea o reemplaza la CmsKey de una StructureComponentSection. `value` debe
/// ser un objeto o una lista JSON.
pub fn set_cms_key<S: FunnelStore>(store: &S, structure_link_id: EntityId, value: Value) -> Result<EntityId, TransferError> {
    if !(value.is_object() || value.is_array()) {
        return Err(TransferError::Validation("cms key value must be a JSON object or array".to_string()));
    }
    store.with_transaction(|session| {
             if session.structure_link_by_id(structure_link_id)?.is_none() {
                 return Err(not_found("structure_component_section", structure_link_id));
             }
             let id = match session.cms_keys_for(&[structure_link_id])?.first() {
                 Some(existing) => existing.id,
                 None => session.next_design_id(DesignTable::CmsKey)?,
             };
             session.upsert_cms_key(&CmsKey { id,
                                              value,
                                              structurecomponentsectionid: structure_link_id })?;
             Ok(id)
         })
}
