//! Graph Importer: reconcilia un `Snapshot` contra el almacenamiento.
//!
//! Toda la importación corre en una única transacción. Dos estrategias de
//! identidad:
//! - Steps: clave natural `step_url` (los ids del snapshot no son portables).
//!   Se mantiene un mapa id del snapshot → id real para traducir las rutas.
//! - Design: upsert por id literal del snapshot.
//!
//! Las anomalías por elemento (ruta colgante, asociación de design huérfana,
//! funnels ambiguos para el producto) se registran como warnings en el
//! informe y no abortan la importación.

use std::collections::{BTreeSet, HashMap, HashSet};

use funnel_domain::{encode_column, CmsKey, Component, ComponentSection, DesignSnapshot, EntityId, Funnel, Section, Snapshot, StepFields,
                    StepSection, Structure, StructureComponentSection};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{StoreError, TransferError};
use crate::store::{DesignTable, FunnelSession, FunnelStore, NewFunnel, NewRoute, NewStep};

/// Elementos de design escritos, por categoría (entidades distintas).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DesignCounts {
    pub sections: usize,
    pub components: usize,
    pub structures: usize,
    pub cms_keys: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub funnel_id: EntityId,
    pub workflow_id: EntityId,
    /// `true` si se crearon funnel y workflow nuevos.
    pub created: bool,
    pub message: String,
    pub steps_imported: usize,
    pub routes_imported: usize,
    pub routes_skipped: usize,
    /// Ausente si el snapshot no traía design.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_imported: Option<DesignCounts>,
    pub warnings: Vec<String>,
}

/// Valida un documento JSON y lo importa.
///
/// La validación estructural ocurre antes de abrir la transacción.
pub fn import_document<S: FunnelStore>(store: &S, document: &Value, update_existing: bool) -> Result<ImportReport, TransferError> {
    let snapshot = Snapshot::from_document(document).inspect_err(|e| warn!("rejected funnel configuration: {e}"))?;
    import_snapshot(store, &snapshot, update_existing)
}

/// Importa un snapshot ya tipado. Commit único al final; rollback completo
/// ante cualquier error.
pub fn import_snapshot<S: FunnelStore>(store: &S, snapshot: &Snapshot, update_existing: bool) -> Result<ImportReport, TransferError> {
    info!("importing funnel {:?} for product {} (update_existing={update_existing})",
          snapshot.funnel.name,
          snapshot.funnel.product.id);
    let result = store.with_transaction(|session| Reconciler::new(session, snapshot).run(update_existing));
    match &result {
        Ok(report) => info!("{}: funnel {} ({} steps, {} routes, {} routes skipped)",
                            report.message,
                            report.funnel_id,
                            report.steps_imported,
                            report.routes_imported,
                            report.routes_skipped),
        Err(e) => error!("funnel import rolled back: {e}"),
    }
    result
}

/// Inserta un step tolerando que otra escritura haya ganado la carrera por
/// la misma URL: ante `UniqueViolation` relee por URL, actualiza esa fila y
/// devuelve su id.
pub fn insert_or_recover(session: &mut dyn FunnelSession, step: &NewStep) -> Result<EntityId, TransferError> {
    match session.insert_step(step) {
        Ok(id) => Ok(id),
        Err(StoreError::UniqueViolation(detail)) => {
            warn!("step '{}' already exists ({detail}); reusing stored row", step.step_url);
            let existing = session.step_by_url(&step.step_url)?
                                  .ok_or(TransferError::Database(StoreError::UniqueViolation(detail)))?;
            session.update_step(existing.id, &step.fields)?;
            Ok(existing.id)
        }
        Err(e) => Err(e.into()),
    }
}

/// Funnel/workflow destino ya resueltos.
struct Target {
    funnel_id: EntityId,
    workflow_id: EntityId,
    created: bool,
    /// Steps alcanzables antes de borrar las rutas (url → id).
    known_steps: HashMap<String, EntityId>,
}

fn name_conflict(err: StoreError) -> TransferError {
    match err {
        StoreError::UniqueViolation(detail) => TransferError::Conflict(detail),
        other => other.into(),
    }
}

fn object_or_empty(value: &Value) -> Value {
    if value.is_null() {
        json!({})
    } else {
        value.clone()
    }
}

struct Reconciler<'s, 'a> {
    session: &'s mut dyn FunnelSession,
    snapshot: &'a Snapshot,
    product_id: i64,
    step_map: HashMap<EntityId, EntityId>,
    warnings: Vec<String>,
}

impl<'s, 'a> Reconciler<'s, 'a> {
    fn new(session: &'s mut dyn FunnelSession, snapshot: &'a Snapshot) -> Self {
        Self { session,
               snapshot,
               product_id: snapshot.funnel.product.id,
               step_map: HashMap::new(),
               warnings: Vec::new() }
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn run(mut self, update_existing: bool) -> Result<ImportReport, TransferError> {
        let target = match self.resolve_target()? {
            Some(existing) if !update_existing => {
                return Err(TransferError::Conflict(format!("funnel '{}' (id {}) already exists for product {}; enable update_existing to overwrite it",
                                                           existing.name.as_deref().unwrap_or("<unnamed>"),
                                                           existing.id,
                                                           self.product_id)))
            }
            Some(existing) => self.update_target(existing)?,
            None => self.create_target()?,
        };

        let steps_imported = self.import_steps(&target.known_steps)?;
        let (routes_imported, routes_skipped) = self.import_routes(target.workflow_id)?;

        let snapshot = self.snapshot;
        let design_imported = match snapshot.design.as_ref().filter(|d| !d.is_empty()) {
            Some(design) => {
                if !target.created {
                    let scope: Vec<EntityId> = target.known_steps
                                                     .values()
                                                     .chain(self.step_map.values())
                                                     .copied()
                                                     .collect::<BTreeSet<_>>()
                                                     .into_iter()
                                                     .collect();
                    self.clear_design(&scope)?;
                }
                Some(self.import_design(design)?)
            }
            None => None,
        };

        let message = if target.created { "Funnel imported" } else { "Funnel updated" };
        Ok(ImportReport { funnel_id: target.funnel_id,
                          workflow_id: target.workflow_id,
                          created: target.created,
                          message: message.to_string(),
                          steps_imported,
                          routes_imported,
                          routes_skipped,
                          design_imported,
                          warnings: self.warnings })
    }

    /// Primero por `funnel.id` del snapshot; si no existe, por producto.
    fn resolve_target(&mut self) -> Result<Option<Funnel>, TransferError> {
        if let Some(id) = self.snapshot.funnel.id {
            if let Some(funnel) = self.session.funnel_by_id(id)? {
                debug!("import target resolved by funnel id {id}");
                return Ok(Some(funnel));
            }
            debug!("funnel id {id} from snapshot not found; falling back to product lookup");
        }
        let mut candidates = self.session.funnels_by_product(self.product_id)?;
        if candidates.len() > 1 {
            let ids: Vec<String> = candidates.iter().map(|f| f.id.to_string()).collect();
            self.warn(format!("{} funnels target product {} ({}); updating funnel {}",
                              candidates.len(),
                              self.product_id,
                              ids.join(", "),
                              candidates[0].id));
        }
        Ok(if candidates.is_empty() { None } else { Some(candidates.remove(0)) })
    }

    fn create_target(&mut self) -> Result<Target, TransferError> {
        let workflow_id = self.session.insert_workflow(self.snapshot.workflow.description.as_deref())?;
        let funnel_id = self.session
                            .insert_funnel(&NewFunnel { name: self.snapshot.funnel.name.clone(),
                                                        broker_id: self.snapshot.funnel.broker_id,
                                                        product_id: Some(self.product_id),
                                                        workflow_id })
                            .map_err(name_conflict)?;
        debug!("created funnel {funnel_id} with workflow {workflow_id}");
        Ok(Target { funnel_id,
                    workflow_id,
                    created: true,
                    known_steps: HashMap::new() })
    }

    fn update_target(&mut self, mut funnel: Funnel) -> Result<Target, TransferError> {
        let description = self.snapshot.workflow.description.as_deref();
        let existing_workflow = match funnel.workflow_id {
            Some(id) => self.session.workflow_by_id(id)?,
            None => None,
        };
        let workflow_id = match existing_workflow {
            Some(workflow) => {
                self.session.update_workflow(workflow.id, description)?;
                workflow.id
            }
            None => {
                let id = self.session.insert_workflow(description)?;
                debug!("funnel {} had no workflow; created workflow {id}", funnel.id);
                id
            }
        };

        // Los steps alcanzables se leen antes de borrar las rutas que los enlazan.
        let routes = self.session.routes_for_workflow(workflow_id)?;
        let step_ids: Vec<EntityId> = routes.iter()
                                            .flat_map(|r| r.fromstep_id.into_iter().chain(Some(r.nextstep_id)))
                                            .collect::<BTreeSet<_>>()
                                            .into_iter()
                                            .collect();
        let known_steps = self.session
                              .steps_by_ids(&step_ids)?
                              .into_iter()
                              .map(|s| (s.step_url, s.id))
                              .collect();
        let removed = self.session.delete_routes_for_workflow(workflow_id)?;
        debug!("workflow {workflow_id}: removed {removed} routes before re-import");

        if let Some(name) = &self.snapshot.funnel.name {
            funnel.name = Some(name.clone());
        }
        funnel.broker_id = self.snapshot.funnel.broker_id;
        funnel.workflow_id = Some(workflow_id);
        self.session.update_funnel(&funnel).map_err(name_conflict)?;

        Ok(Target { funnel_id: funnel.id,
                    workflow_id,
                    created: false,
                    known_steps })
    }

    fn import_steps(&mut self, known: &HashMap<String, EntityId>) -> Result<usize, TransferError> {
        let snapshot = self.snapshot;
        let mut imported = 0;
        for step in &snapshot.steps {
            let fields = StepFields { step_code: step.step_code.clone(),
                                      post_message: step.post_message,
                                      shopping_cart: encode_column(step.shopping_cart.as_ref()),
                                      gtm_reference: encode_column(step.gtm_reference.as_ref()) };
            let real_id = if let Some(&id) = known.get(&step.step_url) {
                self.session.update_step(id, &fields)?;
                id
            } else if let Some(existing) = self.session.step_by_url(&step.step_url)? {
                debug!("step '{}' shared with another workflow; reusing id {}", step.step_url, existing.id);
                self.session.update_step(existing.id, &fields)?;
                existing.id
            } else {
                insert_or_recover(self.session,
                                  &NewStep { step_url: step.step_url.clone(),
                                             fields })?
            };
            if let Some(previous) = self.step_map.insert(step.id, real_id) {
                if previous != real_id {
                    self.warn(format!("snapshot step id {} appears twice with different urls; routes use '{}'",
                                      step.id, step.step_url));
                }
            }
            imported += 1;
        }
        Ok(imported)
    }

    /// Inserta las rutas traduciendo extremos por el mapa de steps.
    /// Devuelve `(importadas, omitidas)`.
    fn import_routes(&mut self, workflow_id: EntityId) -> Result<(usize, usize), TransferError> {
        let mut imported = 0;
        let mut skipped = 0;
        let mut triples = HashSet::new();
        let snapshot = self.snapshot;
        for route in &snapshot.routes {
            let from = match route.fromstep_id {
                None => Some(None),
                Some(id) => self.step_map.get(&id).map(|real| Some(*real)),
            };
            let next = route.nextstep_id.and_then(|id| self.step_map.get(&id).copied());
            let (Some(from), Some(next)) = (from, next) else {
                self.warn(format!("route {:?} skipped: endpoints {:?} -> {:?} not among imported steps",
                                  route.id, route.fromstep_id, route.nextstep_id));
                skipped += 1;
                continue;
            };
            if !triples.insert((from, next)) {
                self.warn(format!("route {:?} duplicates transition {:?} -> {next}; imported as-is", route.id, from));
            }
            self.session.insert_route(&NewRoute { workflow_id,
                                                  fromstep_id: from,
                                                  nextstep_id: next,
                                                  route_config: encode_column(route.route_config.as_ref()) })?;
            imported += 1;
        }
        Ok((imported, skipped))
    }

    /// Borra las asociaciones de design de `step_ids` visibles para el
    /// producto. Orden: StepSection; luego CmsKey → StructureComponentSection
    /// → ComponentSection de las secciones afectadas.
    fn clear_design(&mut self, step_ids: &[EntityId]) -> Result<(), TransferError> {
        let product_id = self.product_id;
        let step_sections: Vec<StepSection> = self.session
                                                  .step_sections_for_steps(step_ids)?
                                                  .into_iter()
                                                  .filter(|ss| ss.visible_for(Some(product_id)))
                                                  .collect();
        if step_sections.is_empty() {
            return Ok(());
        }
        let ss_ids: Vec<EntityId> = step_sections.iter().map(|ss| ss.id).collect();
        let section_ids: Vec<EntityId> =
            step_sections.iter().map(|ss| ss.sectionid).collect::<BTreeSet<_>>().into_iter().collect();
        self.session.delete_step_sections(&ss_ids)?;

        let cs_ids: Vec<EntityId> = self.session
                                        .component_sections_for_sections(&section_ids)?
                                        .into_iter()
                                        .map(|cs| cs.id)
                                        .collect();
        let link_ids: Vec<EntityId> = self.session.structure_links_for(&cs_ids)?.into_iter().map(|l| l.id).collect();
        let keys = self.session.delete_cms_keys_for_links(&link_ids)?;
        let links = self.session.delete_structure_links(&link_ids)?;
        let component_sections = self.session.delete_component_sections(&cs_ids)?;
        debug!("cleared design associations: {} step_sections, {component_sections} component_sections, {links} structure links, {keys} cms keys",
               ss_ids.len());
        Ok(())
    }

    fn import_design(&mut self, design: &DesignSnapshot) -> Result<DesignCounts, TransferError> {
        let mut counts = DesignCounts::default();

        let mut sections = HashSet::new();
        for item in &design.sections {
            self.session.upsert_section(&Section { id: item.id,
                                                   sectiontype: item.sectiontype.clone() })?;
            if sections.insert(item.id) {
                counts.sections += 1;
            }
            match item.stepid.and_then(|id| self.step_map.get(&id).copied()) {
                Some(stepid) => {
                    let id = match item.step_section_id {
                        Some(id) => id,
                        None => self.session.next_design_id(DesignTable::StepSection)?,
                    };
                    self.session.upsert_step_section(&StepSection { id,
                                                                    order: item.order,
                                                                    sectionid: item.id,
                                                                    stepid,
                                                                    productid: item.productid,
                                                                    brokerid: item.brokerid,
                                                                    authorized: item.authorized })?;
                }
                None => self.warn(format!("section {}: step {:?} not imported; step_section skipped", item.id, item.stepid)),
            }
        }

        let mut components = HashSet::new();
        let mut component_sections = HashSet::new();
        for item in &design.components {
            self.session.upsert_component(&Component { id: item.id,
                                                       component_type: item.component_type.clone() })?;
            if components.insert(item.id) {
                counts.components += 1;
            }
            match item.sectionid.filter(|id| sections.contains(id)) {
                Some(sectionid) => {
                    let id = match item.component_section_id {
                        Some(id) => id,
                        None => self.session.next_design_id(DesignTable::ComponentSection)?,
                    };
                    self.session.upsert_component_section(&ComponentSection { id,
                                                                              componentid: item.id,
                                                                              sectionid,
                                                                              order: item.order })?;
                    component_sections.insert(id);
                }
                None => self.warn(format!("component {}: section {:?} not in snapshot; component_section skipped",
                                          item.id, item.sectionid)),
            }
        }

        let mut structures = HashSet::new();
        let mut links = HashSet::new();
        for item in &design.structures {
            self.session.upsert_structure(&Structure { id: item.id,
                                                       data: object_or_empty(&item.data) })?;
            if structures.insert(item.id) {
                counts.structures += 1;
            }
            match item.component_sectionid.filter(|id| component_sections.contains(id)) {
                Some(component_sectionid) => {
                    let id = match item.structure_component_section_id {
                        Some(id) => id,
                        None => self.session.next_design_id(DesignTable::StructureComponentSection)?,
                    };
                    self.session.upsert_structure_link(&StructureComponentSection { id,
                                                                                    component_sectionid,
                                                                                    structureid: item.id,
                                                                                    order: item.order })?;
                    links.insert(id);
                }
                None => self.warn(format!("structure {}: component_section {:?} not in snapshot; link skipped",
                                          item.id, item.component_sectionid)),
            }
        }

        let mut cms_keys = HashSet::new();
        for item in &design.cms_keys {
            if !links.contains(&item.structurecomponentsectionid) {
                self.warn(format!("cms_key {}: structure link {} not in snapshot; skipped",
                                  item.id, item.structurecomponentsectionid));
                continue;
            }
            self.session.upsert_cms_key(&CmsKey { id: item.id,
                                                  value: object_or_empty(&item.value),
                                                  structurecomponentsectionid: item.structurecomponentsectionid })?;
            if cms_keys.insert(item.id) {
                counts.cms_keys += 1;
            }
        }

        self.session.realign_design_ids()?;
        debug!("design imported: {counts:?}");
        Ok(counts)
    }
}
