//! Filas Diesel ↔ entidades del dominio.
//!
//! Las structs `Queryable` siguen el orden de columnas de `schema.rs`. Las
//! filas de design sirven a la vez de `Insertable` y `AsChangeset` para los
//! upserts por id (`treat_none_as_null`: un `None` escribe NULL).

use diesel::prelude::*;
use funnel_domain::{CmsKey, Component, ComponentSection, Funnel, Product, Route, Section, Step, StepFields, StepSection, Structure,
                    StructureComponentSection, Workflow};
use serde_json::Value;

use crate::schema::{cms_key, component, component_section, funnel, route, section, step, step_section, structure,
                    structure_component_section};

#[derive(Queryable, Debug)]
pub struct ProductRow {
    pub id: i64,
    pub product_code: String,
    pub title_prod: Option<String>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product { id: r.id,
                  product_code: r.product_code,
                  title_prod: r.title_prod }
    }
}

#[derive(Queryable, Debug)]
pub struct WorkflowRow {
    pub id: i64,
    pub description: Option<String>,
}

impl From<WorkflowRow> for Workflow {
    fn from(r: WorkflowRow) -> Self {
        Workflow { id: r.id,
                   description: r.description }
    }
}

#[derive(Queryable, Debug)]
pub struct FunnelRow {
    pub id: i64,
    pub name: Option<String>,
    pub broker_id: Option<i64>,
    pub product_id: Option<i64>,
    pub workflow_id: Option<i64>,
}

impl From<FunnelRow> for Funnel {
    fn from(r: FunnelRow) -> Self {
        Funnel { id: r.id,
                 name: r.name,
                 broker_id: r.broker_id,
                 product_id: r.product_id,
                 workflow_id: r.workflow_id }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = funnel)]
pub struct NewFunnelRow<'a> {
    pub name: Option<&'a str>,
    pub broker_id: Option<i64>,
    pub product_id: Option<i64>,
    pub workflow_id: Option<i64>,
}

#[derive(Queryable, Debug)]
pub struct StepRow {
    pub id: i64,
    pub step_url: String,
    pub step_code: Option<String>,
    pub post_message: bool,
    pub shopping_cart: Option<Value>,
    pub gtm_reference: Option<Value>,
}

impl From<StepRow> for Step {
    fn from(r: StepRow) -> Self {
        Step { id: r.id,
               step_url: r.step_url,
               step_code: r.step_code,
               post_message: r.post_message,
               shopping_cart: r.shopping_cart,
               gtm_reference: r.gtm_reference }
    }
}

/// Campos mutables de `step`; sirve para insert (con url) y update (sin url).
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = step, treat_none_as_null = true)]
pub struct StepFieldsRow<'a> {
    pub step_code: Option<&'a str>,
    pub post_message: bool,
    pub shopping_cart: Option<&'a Value>,
    pub gtm_reference: Option<&'a Value>,
}

impl<'a> From<&'a StepFields> for StepFieldsRow<'a> {
    fn from(f: &'a StepFields) -> Self {
        StepFieldsRow { step_code: f.step_code.as_deref(),
                        post_message: f.post_message,
                        shopping_cart: f.shopping_cart.as_ref(),
                        gtm_reference: f.gtm_reference.as_ref() }
    }
}

#[derive(Queryable, Debug)]
pub struct RouteRow {
    pub id: i64,
    pub workflow_id: i64,
    pub fromstep_id: Option<i64>,
    pub nextstep_id: i64,
    pub route_config: Option<Value>,
}

impl From<RouteRow> for Route {
    fn from(r: RouteRow) -> Self {
        Route { id: r.id,
                workflow_id: r.workflow_id,
                fromstep_id: r.fromstep_id,
                nextstep_id: r.nextstep_id,
                route_config: r.route_config }
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = route)]
pub struct NewRouteRow<'a> {
    pub workflow_id: i64,
    pub fromstep_id: Option<i64>,
    pub nextstep_id: i64,
    pub route_config: Option<&'a Value>,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = section)]
pub struct SectionRow {
    pub id: i64,
    pub sectiontype: String,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = component)]
pub struct ComponentRow {
    pub id: i64,
    pub component_type: String,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = structure)]
pub struct StructureRow {
    pub id: i64,
    pub data: Value,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = step_section, treat_none_as_null = true)]
pub struct StepSectionRow {
    pub id: i64,
    pub order: i32,
    pub sectionid: i64,
    pub stepid: i64,
    pub productid: Option<i64>,
    pub brokerid: Option<i64>,
    pub authorized: bool,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = component_section)]
pub struct ComponentSectionRow {
    pub id: i64,
    pub componentid: i64,
    pub sectionid: i64,
    pub order: i32,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = structure_component_section)]
pub struct StructureLinkRow {
    pub id: i64,
    pub component_sectionid: i64,
    pub structureid: i64,
    pub order: i32,
}

#[derive(Queryable, Insertable, AsChangeset, Debug)]
#[diesel(table_name = cms_key)]
pub struct CmsKeyRow {
    pub id: i64,
    pub value: Value,
    pub structurecomponentsectionid: i64,
}

macro_rules! mirror_rows {
    ($($row:ident <=> $entity:ident { $($field:ident),+ }),+ $(,)?) => {
        $(
            impl From<$row> for $entity {
                fn from(r: $row) -> Self {
                    $entity { $($field: r.$field),+ }
                }
            }

            impl From<&$entity> for $row {
                fn from(e: &$entity) -> Self {
                    $row { $($field: e.$field.clone()),+ }
                }
            }
        )+
    };
}

mirror_rows! {
    SectionRow <=> Section { id, sectiontype },
    ComponentRow <=> Component { id, component_type },
    StructureRow <=> Structure { id, data },
    StepSectionRow <=> StepSection { id, order, sectionid, stepid, productid, brokerid, authorized },
    ComponentSectionRow <=> ComponentSection { id, componentid, sectionid, order },
    StructureLinkRow <=> StructureComponentSection { id, component_sectionid, structureid, order },
    CmsKeyRow <=> CmsKey { id, value, structurecomponentsectionid },
}
