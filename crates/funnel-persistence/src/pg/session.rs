//! `FunnelSession` sobre una conexión Postgres.
//!
//! Cada método es una query Diesel; los errores pasan por
//! [`store_err`](crate::error::store_err). `insert_step` corre dentro de un
//! savepoint para que un `step_url` duplicado no invalide la transacción
//! envolvente.

use diesel::prelude::*;
use diesel::sql_types::BigInt;
use funnel_core::{DesignTable, FunnelSession, NewFunnel, NewRoute, NewStep, StoreError, StoreResult};
use funnel_domain::{CmsKey, Component, ComponentSection, EntityId, Funnel, Product, Route, Section, Step, StepFields, StepSection,
                    Structure, StructureComponentSection, Workflow};
use log::debug;

use super::rows::{CmsKeyRow, ComponentRow, ComponentSectionRow, FunnelRow, NewFunnelRow, NewRouteRow, ProductRow, RouteRow,
                  SectionRow, StepFieldsRow, StepRow, StepSectionRow, StructureLinkRow, StructureRow, WorkflowRow};
use crate::error::store_err;
use crate::schema::{cms_key, component, component_section, funnel, products, route, section, step, step_section, structure,
                    structure_component_section, workflow};

pub struct PgSession<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgSession<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

#[derive(QueryableByName)]
struct NextId {
    #[diesel(sql_type = BigInt)]
    id: i64,
}

fn load_as<R, E>(rows: QueryResult<Vec<R>>) -> StoreResult<Vec<E>>
    where E: From<R>
{
    rows.map(|rows| rows.into_iter().map(E::from).collect()).map_err(store_err)
}

fn first_as<R, E>(row: QueryResult<R>) -> StoreResult<Option<E>>
    where E: From<R>
{
    row.optional().map(|row| row.map(E::from)).map_err(store_err)
}

/// `UPDATE` que no tocó filas = la fila no existe.
fn expect_one(affected: QueryResult<usize>) -> StoreResult<()> {
    match affected.map_err(store_err)? {
        0 => Err(StoreError::NotFound),
        _ => Ok(()),
    }
}

impl<'c> FunnelSession for PgSession<'c> {
    fn list_funnels(&mut self) -> StoreResult<Vec<Funnel>> {
        load_as::<FunnelRow, _>(funnel::table.order(funnel::id.asc()).load(self.conn))
    }

    fn funnel_by_id(&mut self, id: EntityId) -> StoreResult<Option<Funnel>> {
        first_as::<FunnelRow, _>(funnel::table.find(id).first(self.conn))
    }

    fn funnels_by_product(&mut self, product_id: i64) -> StoreResult<Vec<Funnel>> {
        load_as::<FunnelRow, _>(funnel::table.filter(funnel::product_id.eq(product_id))
                                             .order(funnel::id.asc())
                                             .load(self.conn))
    }

    fn workflow_by_id(&mut self, id: EntityId) -> StoreResult<Option<Workflow>> {
        first_as::<WorkflowRow, _>(workflow::table.find(id).first(self.conn))
    }

    fn product_by_id(&mut self, id: i64) -> StoreResult<Option<Product>> {
        first_as::<ProductRow, _>(products::table.find(id).first(self.conn))
    }

    fn step_by_id(&mut self, id: EntityId) -> StoreResult<Option<Step>> {
        first_as::<StepRow, _>(step::table.find(id).first(self.conn))
    }

    fn step_by_url(&mut self, url: &str) -> StoreResult<Option<Step>> {
        first_as::<StepRow, _>(step::table.filter(step::step_url.eq(url)).first(self.conn))
    }

    fn steps_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Step>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<StepRow, _>(step::table.filter(step::id.eq_any(ids)).order(step::id.asc()).load(self.conn))
    }

    fn routes_for_workflow(&mut self, workflow_id: EntityId) -> StoreResult<Vec<Route>> {
        load_as::<RouteRow, _>(route::table.filter(route::workflow_id.eq(workflow_id))
                                           .order(route::id.asc())
                                           .load(self.conn))
    }

    fn routes_for_step(&mut self, step_id: EntityId) -> StoreResult<Vec<Route>> {
        load_as::<RouteRow, _>(route::table.filter(route::nextstep_id.eq(step_id).or(route::fromstep_id.eq(step_id)))
                                           .order(route::id.asc())
                                           .load(self.conn))
    }

    fn insert_workflow(&mut self, description: Option<&str>) -> StoreResult<EntityId> {
        diesel::insert_into(workflow::table).values(workflow::description.eq(description))
                                            .returning(workflow::id)
                                            .get_result(self.conn)
                                            .map_err(store_err)
    }

    fn update_workflow(&mut self, id: EntityId, description: Option<&str>) -> StoreResult<()> {
        expect_one(diesel::update(workflow::table.find(id)).set(workflow::description.eq(description))
                                                           .execute(self.conn))
    }

    fn insert_funnel(&mut self, new: &NewFunnel) -> StoreResult<EntityId> {
        let row = NewFunnelRow { name: new.name.as_deref(),
                                 broker_id: new.broker_id,
                                 product_id: new.product_id,
                                 workflow_id: Some(new.workflow_id) };
        diesel::insert_into(funnel::table).values(&row)
                                          .returning(funnel::id)
                                          .get_result(self.conn)
                                          .map_err(store_err)
    }

    fn update_funnel(&mut self, f: &Funnel) -> StoreResult<()> {
        expect_one(diesel::update(funnel::table.find(f.id)).set((funnel::name.eq(f.name.as_deref()),
                                                                 funnel::broker_id.eq(f.broker_id),
                                                                 funnel::product_id.eq(f.product_id),
                                                                 funnel::workflow_id.eq(f.workflow_id)))
                                                           .execute(self.conn))
    }

    fn insert_step(&mut self, new: &NewStep) -> StoreResult<EntityId> {
        let fields = StepFieldsRow::from(&new.fields);
        let res = self.conn.transaction::<EntityId, diesel::result::Error, _>(|sp| {
                               diesel::insert_into(step::table).values((step::step_url.eq(&new.step_url), &fields))
                                                               .returning(step::id)
                                                               .get_result(sp)
                           });
        if let Err(e) = &res {
            debug!("insert_step url={} rolled back to savepoint: {e}", new.step_url);
        }
        res.map_err(store_err)
    }

    fn update_step(&mut self, id: EntityId, fields: &StepFields) -> StoreResult<()> {
        expect_one(diesel::update(step::table.find(id)).set(&StepFieldsRow::from(fields)).execute(self.conn))
    }

    fn delete_step(&mut self, id: EntityId) -> StoreResult<usize> {
        diesel::delete(step::table.find(id)).execute(self.conn).map_err(store_err)
    }

    fn insert_route(&mut self, new: &NewRoute) -> StoreResult<EntityId> {
        let row = NewRouteRow { workflow_id: new.workflow_id,
                                fromstep_id: new.fromstep_id,
                                nextstep_id: new.nextstep_id,
                                route_config: new.route_config.as_ref() };
        diesel::insert_into(route::table).values(&row)
                                         .returning(route::id)
                                         .get_result(self.conn)
                                         .map_err(store_err)
    }

    fn delete_route(&mut self, id: EntityId) -> StoreResult<usize> {
        diesel::delete(route::table.find(id)).execute(self.conn).map_err(store_err)
    }

    fn delete_routes_for_workflow(&mut self, workflow_id: EntityId) -> StoreResult<usize> {
        diesel::delete(route::table.filter(route::workflow_id.eq(workflow_id))).execute(self.conn)
                                                                             .map_err(store_err)
    }

    fn step_sections_for_steps(&mut self, step_ids: &[EntityId]) -> StoreResult<Vec<StepSection>> {
        if step_ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<StepSectionRow, _>(step_section::table.filter(step_section::stepid.eq_any(step_ids))
                                                        .order(step_section::id.asc())
                                                        .load(self.conn))
    }

    fn sections_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Section>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<SectionRow, _>(section::table.filter(section::id.eq_any(ids)).order(section::id.asc()).load(self.conn))
    }

    fn components_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Component>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<ComponentRow, _>(component::table.filter(component::id.eq_any(ids))
                                                   .order(component::id.asc())
                                                   .load(self.conn))
    }

    fn component_section_by_id(&mut self, id: EntityId) -> StoreResult<Option<ComponentSection>> {
        first_as::<ComponentSectionRow, _>(component_section::table.find(id).first(self.conn))
    }

    fn component_sections_for_sections(&mut self, section_ids: &[EntityId]) -> StoreResult<Vec<ComponentSection>> {
        if section_ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<ComponentSectionRow, _>(component_section::table.filter(component_section::sectionid.eq_any(section_ids))
                                                                  .order(component_section::id.asc())
                                                                  .load(self.conn))
    }

    fn structure_link_by_id(&mut self, id: EntityId) -> StoreResult<Option<StructureComponentSection>> {
        first_as::<StructureLinkRow, _>(structure_component_section::table.find(id).first(self.conn))
    }

    fn structure_links_for(&mut self, component_section_ids: &[EntityId]) -> StoreResult<Vec<StructureComponentSection>> {
        if component_section_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = structure_component_section::table
            .filter(structure_component_section::component_sectionid.eq_any(component_section_ids))
            .order(structure_component_section::id.asc());
        load_as::<StructureLinkRow, _>(query.load(self.conn))
    }

    fn structure_links_to(&mut self, structure_ids: &[EntityId]) -> StoreResult<Vec<StructureComponentSection>> {
        if structure_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = structure_component_section::table
            .filter(structure_component_section::structureid.eq_any(structure_ids))
            .order(structure_component_section::id.asc());
        load_as::<StructureLinkRow, _>(query.load(self.conn))
    }

    fn structures_by_ids(&mut self, ids: &[EntityId]) -> StoreResult<Vec<Structure>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<StructureRow, _>(structure::table.filter(structure::id.eq_any(ids))
                                                   .order(structure::id.asc())
                                                   .load(self.conn))
    }

    fn cms_keys_for(&mut self, link_ids: &[EntityId]) -> StoreResult<Vec<CmsKey>> {
        if link_ids.is_empty() {
            return Ok(Vec::new());
        }
        load_as::<CmsKeyRow, _>(cms_key::table.filter(cms_key::structurecomponentsectionid.eq_any(link_ids))
                                              .order(cms_key::id.asc())
                                              .load(self.conn))
    }

    fn next_design_id(&mut self, table: DesignTable) -> StoreResult<EntityId> {
        // Nunca por debajo de MAX(id)+1: los ids literales de un import no
        // avanzan la secuencia.
        let t = table.table_name();
        let sql = format!("SELECT GREATEST(nextval(pg_get_serial_sequence('{t}', 'id')), \
                           (SELECT COALESCE(MAX(id), 0) + 1 FROM {t})) AS id");
        let next: NextId = diesel::sql_query(sql).get_result(self.conn).map_err(store_err)?;
        Ok(next.id)
    }

    fn realign_design_ids(&mut self) -> StoreResult<()> {
        for table in DesignTable::ALL {
            let t = table.table_name();
            let sql = format!("SELECT setval(pg_get_serial_sequence('{t}', 'id'), \
                               COALESCE((SELECT MAX(id) FROM {t}), 0) + 1, false)");
            diesel::sql_query(sql).execute(self.conn).map_err(store_err)?;
        }
        debug!("design sequences realigned");
        Ok(())
    }

    fn upsert_section(&mut self, s: &Section) -> StoreResult<()> {
        let row = SectionRow::from(s);
        diesel::insert_into(section::table).values(&row)
                                           .on_conflict(section::id)
                                           .do_update()
                                           .set(&row)
                                           .execute(self.conn)
                                           .map(|_| ())
                                           .map_err(store_err)
    }

    fn upsert_component(&mut self, c: &Component) -> StoreResult<()> {
        let row = ComponentRow::from(c);
        diesel::insert_into(component::table).values(&row)
                                             .on_conflict(component::id)
                                             .do_update()
                                             .set(&row)
                                             .execute(self.conn)
                                             .map(|_| ())
                                             .map_err(store_err)
    }

    fn upsert_structure(&mut self, s: &Structure) -> StoreResult<()> {
        let row = StructureRow::from(s);
        diesel::insert_into(structure::table).values(&row)
                                             .on_conflict(structure::id)
                                             .do_update()
                                             .set(&row)
                                             .execute(self.conn)
                                             .map(|_| ())
                                             .map_err(store_err)
    }

    fn upsert_step_section(&mut self, ss: &StepSection) -> StoreResult<()> {
        let row = StepSectionRow::from(ss);
        diesel::insert_into(step_section::table).values(&row)
                                                .on_conflict(step_section::id)
                                                .do_update()
                                                .set(&row)
                                                .execute(self.conn)
                                                .map(|_| ())
                                                .map_err(store_err)
    }

    fn upsert_component_section(&mut self, cs: &ComponentSection) -> StoreResult<()> {
        let row = ComponentSectionRow::from(cs);
        diesel::insert_into(component_section::table).values(&row)
                                                     .on_conflict(component_section::id)
                                                     .do_update()
                                                     .set(&row)
                                                     .execute(self.conn)
                                                     .map(|_| ())
                                                     .map_err(store_err)
    }

    fn upsert_structure_link(&mut self, link: &StructureComponentSection) -> StoreResult<()> {
        let row = StructureLinkRow::from(link);
        diesel::insert_into(structure_component_section::table).values(&row)
                                                               .on_conflict(structure_component_section::id)
                                                               .do_update()
                                                               .set(&row)
                                                               .execute(self.conn)
                                                               .map(|_| ())
                                                               .map_err(store_err)
    }

    fn upsert_cms_key(&mut self, key: &CmsKey) -> StoreResult<()> {
        let row = CmsKeyRow::from(key);
        diesel::insert_into(cms_key::table).values(&row)
                                           .on_conflict(cms_key::id)
                                           .do_update()
                                           .set(&row)
                                           .execute(self.conn)
                                           .map(|_| ())
                                           .map_err(store_err)
    }

    fn delete_step_sections(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        diesel::delete(step_section::table.filter(step_section::id.eq_any(ids))).execute(self.conn)
                                                                               .map_err(store_err)
    }

    fn delete_component_sections(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        diesel::delete(component_section::table.filter(component_section::id.eq_any(ids))).execute(self.conn)
                                                                                         .map_err(store_err)
    }

    fn delete_structure_links(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        diesel::delete(structure_component_section::table.filter(structure_component_section::id.eq_any(ids)))
            .execute(self.conn)
            .map_err(store_err)
    }

    fn delete_structures(&mut self, ids: &[EntityId]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        diesel::delete(structure::table.filter(structure::id.eq_any(ids))).execute(self.conn)
                                                                         .map_err(store_err)
    }

    fn delete_cms_keys_for_links(&mut self, link_ids: &[EntityId]) -> StoreResult<usize> {
        if link_ids.is_empty() {
            return Ok(0);
        }
        diesel::delete(cms_key::table.filter(cms_key::structurecomponentsectionid.eq_any(link_ids)))
            .execute(self.conn)
            .map_err(store_err)
    }
}
