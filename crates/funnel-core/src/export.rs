//! Graph Exporter: cierre relacional alcanzable de un funnel → `Snapshot`.
//!
//! Solo se exportan los steps que aparecen como extremo de alguna ruta del
//! workflow. El design se filtra por esos steps y por el producto del funnel
//! (`step_section.productid` nulo o igual al producto) y se sigue la cadena
//! Section → ComponentSection → StructureComponentSection → CmsKey.

use std::collections::{BTreeSet, HashMap};

use chrono::Local;
use funnel_domain::{decode_column, CmsKeyItem, ComponentItem, DesignSnapshot, EntityId, FunnelSnapshot, JsonFallback,
                    ProductSnapshot, RouteSnapshot, SectionItem, Snapshot, SnapshotMetadata, StepSection, StepSnapshot,
                    StructureItem, WorkflowSnapshot, SNAPSHOT_VERSION};
use log::{debug, error, info};
use serde_json::Value;

use crate::errors::TransferError;
use crate::store::{FunnelSession, FunnelStore};

/// Exporta el funnel `funnel_id`. Sin salida parcial: cualquier error aborta.
pub fn export_funnel<S: FunnelStore>(store: &S, funnel_id: EntityId) -> Result<Snapshot, TransferError> {
    info!("exporting funnel {funnel_id}");
    let result = store.with_session(|session| collect(session, funnel_id));
    match &result {
        Ok(snapshot) => info!("funnel {funnel_id} exported: {} steps, {} routes, {} design sections",
                              snapshot.steps.len(),
                              snapshot.routes.len(),
                              snapshot.design.as_ref().map_or(0, |d| d.sections.len())),
        Err(e) => error!("export of funnel {funnel_id} failed: {e}"),
    }
    result
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

fn collect(session: &mut dyn FunnelSession, funnel_id: EntityId) -> Result<Snapshot, TransferError> {
    let funnel = session.funnel_by_id(funnel_id)?
                        .ok_or_else(|| TransferError::NotFound(format!("funnel {funnel_id} not found")))?;
    let workflow_id = funnel.workflow_id
                            .ok_or_else(|| TransferError::NotFound(format!("funnel {funnel_id} has no workflow")))?;
    let workflow = session.workflow_by_id(workflow_id)?
                          .ok_or_else(|| TransferError::NotFound(format!("workflow {workflow_id} of funnel {funnel_id} not found")))?;
    let product_id = funnel.product_id
                           .ok_or_else(|| TransferError::NotFound(format!("funnel {funnel_id} has no product")))?;
    let product = session.product_by_id(product_id)?
                         .ok_or_else(|| TransferError::NotFound(format!("product {product_id} of funnel {funnel_id} not found")))?;

    let routes = session.routes_for_workflow(workflow_id)?;
    let reachable: BTreeSet<EntityId> = routes.iter()
                                              .flat_map(|r| r.fromstep_id.into_iter().chain(Some(r.nextstep_id)))
                                              .collect();
    let reachable: Vec<EntityId> = reachable.into_iter().collect();
    let steps = session.steps_by_ids(&reachable)?;
    debug!("funnel {funnel_id}: {} routes, {} reachable steps", routes.len(), steps.len());

    let urls: HashMap<EntityId, String> = steps.iter().map(|s| (s.id, s.step_url.clone())).collect();

    let step_items = steps.into_iter()
                          .map(|s| {
                              let ctx = format!("step {}", s.id);
                              StepSnapshot { id: s.id,
                                             shopping_cart: non_null(decode_column(s.shopping_cart,
                                                                                   JsonFallback::Null,
                                                                                   &format!("{ctx} shopping_cart"))),
                                             gtm_reference: non_null(decode_column(s.gtm_reference,
                                                                                   JsonFallback::Null,
                                                                                   &format!("{ctx} gtm_reference"))),
                                             step_url: s.step_url,
                                             step_code: s.step_code,
                                             post_message: s.post_message }
                          })
                          .collect();

    let route_items = routes.into_iter()
                            .map(|r| RouteSnapshot { id: Some(r.id),
                                                     fromstep_id: r.fromstep_id,
                                                     nextstep_id: Some(r.nextstep_id),
                                                     route_config: non_null(decode_column(r.route_config,
                                                                                          JsonFallback::Null,
                                                                                          &format!("route {} route_config", r.id))),
                                                     from_step_url: r.fromstep_id.and_then(|id| urls.get(&id).cloned()),
                                                     to_step_url: urls.get(&r.nextstep_id).cloned() })
                            .collect();

    let design = collect_design(session, &reachable, product_id)?;

    Ok(Snapshot { funnel: FunnelSnapshot { id: Some(funnel.id),
                                           name: funnel.name,
                                           broker_id: funnel.broker_id,
                                           product: ProductSnapshot { id: product_id,
                                                                      code: Some(product.product_code),
                                                                      name: product.title_prod } },
                  workflow: WorkflowSnapshot { id: Some(workflow.id), description: workflow.description },
                  steps: step_items,
                  routes: route_items,
                  design: Some(design),
                  metadata: Some(SnapshotMetadata { exported_at: Local::now().to_rfc3339(),
                                                    version: SNAPSHOT_VERSION.to_string(),
                                                    includes_design: true }) })
}

fn collect_design(session: &mut dyn FunnelSession, step_ids: &[EntityId], product_id: i64) -> Result<DesignSnapshot, TransferError> {
    let step_sections: Vec<StepSection> = session.step_sections_for_steps(step_ids)?
                                                 .into_iter()
                                                 .filter(|ss| ss.visible_for(Some(product_id)))
                                                 .collect();
    let section_ids: Vec<EntityId> = step_sections.iter().map(|ss| ss.sectionid).collect::<BTreeSet<_>>().into_iter().collect();
    let sections: HashMap<EntityId, _> = session.sections_by_ids(&section_ids)?.into_iter().map(|s| (s.id, s)).collect();

    let mut section_items: Vec<SectionItem> =
        step_sections.iter()
                     .filter_map(|ss| {
                         sections.get(&ss.sectionid).map(|sec| SectionItem { id: sec.id,
                                                                            sectiontype: sec.sectiontype.clone(),
                                                                            step_section_id: Some(ss.id),
                                                                            order: ss.order,
                                                                            stepid: Some(ss.stepid),
                                                                            productid: ss.productid,
                                                                            brokerid: ss.brokerid,
                                                                            authorized: ss.authorized })
                     })
                     .collect();
    section_items.sort_by_key(|s| (s.id, s.step_section_id));

    let component_sections = session.component_sections_for_sections(&section_ids)?;
    let component_ids: Vec<EntityId> =
        component_sections.iter().map(|cs| cs.componentid).collect::<BTreeSet<_>>().into_iter().collect();
    let components: HashMap<EntityId, _> = session.components_by_ids(&component_ids)?.into_iter().map(|c| (c.id, c)).collect();
    let mut component_items: Vec<ComponentItem> =
        component_sections.iter()
                          .filter_map(|cs| {
                              components.get(&cs.componentid).map(|c| ComponentItem { id: c.id,
                                                                                      component_type: c.component_type.clone(),
                                                                                      component_section_id: Some(cs.id),
                                                                                      order: cs.order,
                                                                                      sectionid: Some(cs.sectionid) })
                          })
                          .collect();
    component_items.sort_by_key(|c| (c.id, c.component_section_id));

    let cs_ids: Vec<EntityId> = component_sections.iter().map(|cs| cs.id).collect();
    let links = session.structure_links_for(&cs_ids)?;
    let structure_ids: Vec<EntityId> = links.iter().map(|l| l.structureid).collect::<BTreeSet<_>>().into_iter().collect();
    let structures: HashMap<EntityId, _> = session.structures_by_ids(&structure_ids)?.into_iter().map(|s| (s.id, s)).collect();
    let mut structure_items: Vec<StructureItem> =
        links.iter()
             .filter_map(|link| {
                 structures.get(&link.structureid).map(|s| StructureItem { id: s.id,
                                                                          data: decode_column(Some(s.data.clone()),
                                                                                              JsonFallback::EmptyObject,
                                                                                              &format!("structure {} data", s.id)),
                                                                          structure_component_section_id: Some(link.id),
                                                                          component_sectionid: Some(link.component_sectionid),
                                                                          order: link.order })
             })
             .collect();
    structure_items.sort_by_key(|s| (s.id, s.structure_component_section_id));

    let link_ids: Vec<EntityId> = links.iter().map(|l| l.id).collect();
    let mut cms_items: Vec<CmsKeyItem> =
        session.cms_keys_for(&link_ids)?
               .into_iter()
               .map(|k| CmsKeyItem { value: decode_column(Some(k.value), JsonFallback::EmptyObject, &format!("cms_key {} value", k.id)),
                                     id: k.id,
                                     structurecomponentsectionid: k.structurecomponentsectionid })
               .collect();
    cms_items.sort_by_key(|k| k.id);

    Ok(DesignSnapshot { sections: section_items,
                        components: component_items,
                        structures: structure_items,
                        cms_keys: cms_items })
}
