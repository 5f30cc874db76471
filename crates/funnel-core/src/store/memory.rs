//! Backend en memoria con la misma semántica que el de Postgres.
//!
//! Reproduce las restricciones que el importer necesita observar: `step_url`
//! y nombre de funnel únicos, claves foráneas con `RESTRICT` y secuencias que
//! no reutilizan ids. Una transacción trabaja sobre una copia de las tablas y
//! solo la publica si el closure devuelve `Ok`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use funnel_domain::{CmsKey, Component, ComponentSection, EntityId, Funnel, Product, Route, Section, Step, StepFields, StepSection,
                    Structure, StructureComponentSection, Workflow};

use super::{DesignTable, FunnelSession, FunnelStore, NewFunnel, NewRoute, NewStep};
use crate::errors::{StoreError, StoreResult, TransferError};

#[derive(Debug, Clone, Default)]
struct Tables {
    workflows: BTreeMap<EntityId, Workflow>,
    funnels: BTreeMap<EntityId, Funnel>,
    products: BTreeMap<i64, Product>,
    steps: BTreeMap<EntityId, Step>,
    routes: BTreeMap<EntityId, Route>,
    sections: BTreeMap<EntityId, Section>,
    components: BTreeMap<EntityId, Component>,
    structures: BTreeMap<EntityId, Structure>,
    step_sections: BTreeMap<EntityId, StepSection>,
    component_sections: BTreeMap<EntityId, ComponentSection>,
    structure_links: BTreeMap<EntityId, StructureComponentSection>,
    cms_keys: BTreeMap<EntityId, CmsKey>,
    sequences: HashMap<&'static str, EntityId>,
}

/// Siguiente valor de la secuencia `name`; nunca por debajo del id máximo.
fn next_serial<V>(sequences: &mut HashMap<&'static str, EntityId>, name: &'static str, rows: &BTreeMap<EntityId, V>) -> EntityId {
    let max = rows.keys().next_back().copied().unwrap_or(0);
    let current = sequences.entry(name).or_insert(0);
    *current = (*current).max(max) + 1;
    *current
}

fn select<V: Clone>(rows: &BTreeMap<EntityId, V>, ids: &[EntityId]) -> Vec<V> {
    let wanted: HashSet<EntityId> = ids.iter().copied().collect();
    rows.iter().filter(|(id, _)| wanted.contains(id)).map(|(_, v)| v.clone()).collect()
}

fn remove_where<V>(rows: &mut BTreeMap<EntityId, V>, pred: impl Fn(&EntityId, &V) -> bool) -> usize {
    let before = rows.len();
    rows.retain(|id, v| !pred(id, v));
    before - rows.len()
}

fn fk(ok: bool, what: impl Into<String>) -> StoreResult<()> {
    if ok {
        Ok(())
    } else {
        Err(StoreError::ForeignKeyViolation(what.into()))
    }
}

impl Tables {
    fn sequence_for(&mut self, table: DesignTable) -> EntityId {
        let name = table.table_name();
        match table {
            DesignTable::Section => next_serial(&mut self.sequences, name, &self.sections),
            DesignTable::Component => next_serial(&mut self.sequences, name, &self.components),
            DesignTable::Structure => next_serial(&mut self.sequences, name, &self.structures),
            DesignTable::StepSection => next_serial(&mut self.sequences, name, &self.step_sections),
            DesignTable::ComponentSection => next_serial(&mut self.sequences, name, &self.component_sections),
            DesignTable::StructureComponentSection => next_serial(&mut self.sequences, name, &self.structure_links),
            DesignTable::CmsKey => next_serial(&mut self.sequences, name, &self.cms_keys),
        }
    }
}

struct MemorySession<'a> {
    tables: &'a mut Tables,
}

impl FunnelSession for MemorySession<'_> {
    fn list_funnels(&mut self) -> StoreResult<Vec<Funnel>> {
        Ok(self.tables.funnels.values().cloned().collect())
    }

    fn funnel_by_id(&mut self, id: EntityId) -> StoreResult<Option<Funnel>> {
        Ok(self.tables.funnels.get(&id).cloned())
    }

    fn funnels_by_product(&mut self, product_id: i64) -> StoreResult<Vec<Funnel>> {
        Ok(self.tables.funnels.values().filter(|f| f.product_id == Some(product_id)).cloned().collect())
    }

    fn workflow_by_id(&mut self, id: EntityId) -> StoreResult<Option<Workflow>> {
        Ok(self.tables.workflows.get(&id).cloned())
    }

    fn product_by_id(&mut self, id: i64) -> StoreResult<Option<Product>> {
        Ok(self.tables.products.get(&id).cloned())
    }

    fn step_by_id(&mut self, id: EntityId) -> StoreResult<Option<Step>> {
        Ok(self.tables.steps.get(&id).cloned())
    }

    fn step_by_url(&mut self, url: &str) -> StoreResult<Option<Step>> {
        Ok(self.tables.steps.values().find(|s| s.step_url == url).cloned())
    }

    fn steps_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Step>> {
        Ok(select(&self.tables.steps, ids))
    }

    fn routes_for_workflow(&mut self, workflow_id: EntityId) -> StoreResult<Vec<Route>> {
        Ok(self.tables.routes.values().filter(|r| r.workflow_id == workflow_id).cloned().collect())
    }

    fn routes_for_step(&mut self, step_id: EntityId) -> StoreResult<Vec<Route>> {
        Ok(self.tables.routes.values().filter(|r| r.touches(step_id)).cloned().collect())
    }

    fn insert_workflow(&mut self, description: Option<&str>) -> StoreResult<EntityId> {
        let id = next_serial(&mut self.tables.sequences, "funnel_manager.workflow", &self.tables.workflows);
        self.tables.workflows.insert(id, Workflow { id, description: description.map(str::to_string) });
        Ok(id)
    }

    fn update_workflow(&mut self, id: EntityId, description: Option<&str>) -> StoreResult<()> {
        let row = self.tables.workflows.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.description = description.map(str::to_string);
        Ok(())
    }

    fn insert_funnel(&mut self, funnel: &NewFunnel) -> StoreResult<EntityId> {
        fk(self.tables.workflows.contains_key(&funnel.workflow_id), "funnel.workflow_id")?;
        if let Some(name) = &funnel.name {
            if self.tables.funnels.values().any(|f| f.name.as_deref() == Some(name.as_str())) {
                return Err(StoreError::UniqueViolation(format!("funnel name '{name}' already exists")));
            }
        }
        let id = next_serial(&mut self.tables.sequences, "funnel_manager.funnel", &self.tables.funnels);
        self.tables.funnels.insert(id,
                                   Funnel { id,
                                            name: funnel.name.clone(),
                                            broker_id: funnel.broker_id,
                                            product_id: funnel.product_id,
                                            workflow_id: Some(funnel.workflow_id) });
        Ok(id)
    }

    fn update_funnel(&mut self, funnel: &Funnel) -> StoreResult<()> {
        if let Some(wid) = funnel.workflow_id {
            fk(self.tables.workflows.contains_key(&wid), "funnel.workflow_id")?;
        }
        if let Some(name) = &funnel.name {
            if self.tables.funnels.values().any(|f| f.id != funnel.id && f.name.as_deref() == Some(name.as_str())) {
                return Err(StoreError::UniqueViolation(format!("funnel name '{name}' already exists")));
            }
        }
        let row = self.tables.funnels.get_mut(&funnel.id).ok_or(StoreError::NotFound)?;
        *row = funnel.clone();
        Ok(())
    }

    fn insert_step(&mut self, step: &NewStep) -> StoreResult<EntityId> {
        if self.tables.steps.values().any(|s| s.step_url == step.step_url) {
            return Err(StoreError::UniqueViolation(format!("step_url '{}' already exists", step.step_url)));
        }
        let id = next_serial(&mut self.tables.sequences, "funnel_manager.step", &self.tables.steps);
        let fields = step.fields.clone();
        self.tables.steps.insert(id,
                                 Step { id,
                                        step_url: step.step_url.clone(),
                                        step_code: fields.step_code,
                                        post_message: fields.post_message,
                                        shopping_cart: fields.shopping_cart,
                                        gtm_reference: fields.gtm_reference });
        Ok(id)
    }

    fn update_step(&mut self, id: EntityId, fields: &StepFields) -> StoreResult<()> {
        let row = self.tables.steps.get_mut(&id).ok_or(StoreError::NotFound)?;
        row.step_code = fields.step_code.clone();
        row.post_message = fields.post_message;
        row.shopping_cart = fields.shopping_cart.clone();
        row.gtm_reference = fields.gtm_reference.clone();
        Ok(())
    }

    fn delete_step(&mut self, id: EntityId) -> StoreResult<usize> {
        fk(!self.tables.routes.values().any(|r| r.touches(id)), format!("step {id} is referenced by route"))?;
        Ok(usize::from(self.tables.steps.remove(&id).is_some()))
    }

    fn insert_route(&mut self, route: &NewRoute) -> StoreResult<EntityId> {
        fk(self.tables.workflows.contains_key(&route.workflow_id), "route.workflow_id")?;
        fk(self.tables.steps.contains_key(&route.nextstep_id), "route.nextstep_id")?;
        if let Some(from) = route.fromstep_id {
            fk(self.tables.steps.contains_key(&from), "route.fromstep_id")?;
        }
        let id = next_serial(&mut self.tables.sequences, "funnel_manager.route", &self.tables.routes);
        self.tables.routes.insert(id,
                                  Route { id,
                                          workflow_id: route.workflow_id,
                                          fromstep_id: route.fromstep_id,
                                          nextstep_id: route.nextstep_id,
                                          route_config: route.route_config.clone() });
        Ok(id)
    }

    fn delete_route(&mut self, id: EntityId) -> StoreResult<usize> {
        Ok(usize::from(self.tables.routes.remove(&id).is_some()))
    }

    fn delete_routes_for_workflow(&mut self, workflow_id: EntityId) -> StoreResult<usize> {
        Ok(remove_where(&mut self.tables.routes, |_, r| r.workflow_id == workflow_id))
    }

    fn step_sections_for_steps(&mut self, step_ids: &[EntityId]) -> StoreResult<Vec<StepSection>> {
        let wanted: HashSet<EntityId> = step_ids.iter().copied().collect();
        Ok(self.tables.step_sections.values().filter(|ss| wanted.contains(&ss.stepid)).cloned().collect())
    }

    fn sections_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Section>> {
        Ok(select(&self.tables.sections, ids))
    }

    fn components_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Component>> {
        Ok(select(&self.tables.components, ids))
    }

    fn component_section_by_id(&mut self, id: EntityId) -> StoreResult<Option<ComponentSection>> {
        Ok(self.tables.component_sections.get(&id).cloned())
    }

    fn component_sections_for_sections(&mut self, section_ids: &[EntityId]) -> StoreResult<Vec<ComponentSection>> {
        let wanted: HashSet<EntityId> = section_ids.iter().copied().collect();
        Ok(self.tables.component_sections.values().filter(|cs| wanted.contains(&cs.sectionid)).cloned().collect())
    }

    fn structure_link_by_id(&mut self, id: EntityId) -> StoreResult<Option<StructureComponentSection>> {
        Ok(self.tables.structure_links.get(&id).cloned())
    }

    fn structure_links_for(&mut self, component_section_ids: &[EntityId]) -> StoreResult<Vec<StructureComponentSection>> {
        let wanted: HashSet<EntityId> = component_section_ids.iter().copied().collect();
        Ok(self.tables.structure_links.values().filter(|l| wanted.contains(&l.component_sectionid)).cloned().collect())
    }

    fn structure_links_to(&mut self, structure_ids: &[EntityId]) -> StoreResult<Vec<StructureComponentSection>> {
        let wanted: HashSet<EntityId> = structure_ids.iter().copied().collect();
        Ok(self.tables.structure_links.values().filter(|l| wanted.contains(&l.structureid)).cloned().collect())
    }

    fn structures_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Structure>> {
        Ok(select(&self.tables.structures, ids))
    }

    fn cms_keys_for(&mut self, link_ids: &[EntityId]) -> StoreResult<Vec<CmsKey>> {
        let wanted: HashSet<EntityId> = link_ids.iter().copied().collect();
        Ok(self.tables.cms_keys.values().filter(|k| wanted.contains(&k.structurecomponentsectionid)).cloned().collect())
    }

    fn next_design_id(&mut self, table: DesignTable) -> StoreResult<EntityId> {
        Ok(self.tables.sequence_for(table))
    }

    fn realign_design_ids(&mut self) -> StoreResult<()> {
        // next_serial ya parte del id máximo presente.
        Ok(())
    }

    fn upsert_section(&mut self, section: &Section) -> StoreResult<()> {
        self.tables.sections.insert(section.id, section.clone());
        Ok(())
    }

    fn upsert_component(&mut self, component: &Component) -> StoreResult<()> {
        self.tables.components.insert(component.id, component.clone());
        Ok(())
    }

    fn upsert_structure(&mut self, structure: &Structure) -> StoreResult<()> {
        self.tables.structures.insert(structure.id, structure.clone());
        Ok(())
    }

    fn upsert_step_section(&mut self, step_section: &StepSection) -> StoreResult<()> {
        fk(self.tables.sections.contains_key(&step_section.sectionid), "step_section.sectionid")?;
        self.tables.step_sections.insert(step_section.id, step_section.clone());
        Ok(())
    }

    fn upsert_component_section(&mut self, component_section: &ComponentSection) -> StoreResult<()> {
        fk(self.tables.components.contains_key(&component_section.componentid), "component_section.componentid")?;
        fk(self.tables.sections.contains_key(&component_section.sectionid), "component_section.sectionid")?;
        self.tables.component_sections.insert(component_section.id, component_section.clone());
        Ok(())
    }

    fn upsert_structure_link(&mut self, link: &StructureComponentSection) -> StoreResult<()> {
        fk(self.tables.component_sections.contains_key(&link.component_sectionid),
           "structure_component_section.component_sectionid")?;
        fk(self.tables.structures.contains_key(&link.structureid), "structure_component_section.structureid")?;
        self.tables.structure_links.insert(link.id, link.clone());
        Ok(())
    }

    fn upsert_cms_key(&mut self, cms_key: &CmsKey) -> StoreResult<()> {
        fk(self.tables.structure_links.contains_key(&cms_key.structurecomponentsectionid),
           "cms_key.structurecomponentsectionid")?;
        self.tables.cms_keys.insert(cms_key.id, cms_key.clone());
        Ok(())
    }

    fn delete_step_sections(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        Ok(remove_where(&mut self.tables.step_sections, |id, _| wanted.contains(id)))
    }

    fn delete_component_sections(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        fk(!self.tables.structure_links.values().any(|l| wanted.contains(&l.component_sectionid)),
           "component_section is referenced by structure_component_section")?;
        Ok(remove_where(&mut self.tables.component_sections, |id, _| wanted.contains(id)))
    }

    fn delete_structure_links(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        fk(!self.tables.cms_keys.values().any(|k| wanted.contains(&k.structurecomponentsectionid)),
           "structure_component_section is referenced by cms_key")?;
        Ok(remove_where(&mut self.tables.structure_links, |id, _| wanted.contains(id)))
    }

    fn delete_structures(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        let wanted: HashSet<EntityId> = ids.iter().copied().collect();
        fk(!self.tables.structure_links.values().any(|l| wanted.contains(&l.structureid)),
           "structure is referenced by structure_component_section")?;
        Ok(remove_where(&mut self.tables.structures, |id, _| wanted.contains(id)))
    }

    fn delete_cms_keys_for_links(&mut self, link_ids: &[EntityId]) -> StoreResult<usize> {
        let wanted: HashSet<EntityId> = link_ids.iter().copied().collect();
        Ok(remove_where(&mut self.tables.cms_keys, |_, k| wanted.contains(&k.structurecomponentsectionid)))
    }
}

/// Almacenamiento en memoria, seguro entre hilos.
#[derive(Debug, Default)]
pub struct InMemoryFunnelStore {
    inner: Mutex<Tables>,
}

impl InMemoryFunnelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un producto del catálogo externo (tabla de solo lectura).
    pub fn add_product(&self, product: Product) {
        self.lock().products.insert(product.id, product);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // Un panic dentro de una transacción no publica la copia de trabajo,
        // así que las tablas siguen consistentes tras el envenenamiento.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FunnelStore for InMemoryFunnelStore {
    fn with_session<T, F>(&self, f: F) -> Result<T, TransferError>
        where F: FnOnce(&mut dyn FunnelSession) -> Result<T, TransferError>
    {
        let mut guard = self.lock();
        let mut session = MemorySession { tables: &mut *guard };
        f(&mut session)
    }

    fn with_transaction<T, F>(&self, f: F) -> Result<T, TransferError>
        where F: FnOnce(&mut dyn FunnelSession) -> Result<T, TransferError>
    {
        let mut guard = self.lock();
        let mut working = guard.clone();
        let result = {
            let mut session = MemorySession { tables: &mut working };
            f(&mut session)
        };
        if result.is_ok() {
            *guard = working;
        }
        result
    }
}
