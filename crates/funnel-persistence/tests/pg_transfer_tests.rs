use funnel_core::catalog::{self, SectionPlacement};
use funnel_core::{export_funnel, import_document, ErrorKind, FunnelStore};
use funnel_domain::StructureComponentSection;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use serde_json::{json, Value};
use test_support::{insert_product, pg_store, unique, unique_product_id, with_pool};

#[derive(QueryableByName)]
struct Count {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

fn document(name: &str, product_id: i64, landing: &str, thanks: &str) -> Value {
    json!({
        "funnel": {"name": name, "broker_id": 3, "product": {"id": product_id, "code": "PG", "name": "Pg product"}},
        "workflow": {"description": format!("{name} workflow")},
        "steps": [
            {"id": 10, "step_url": landing, "step_code": "L", "post_message": false,
             "shopping_cart": {"items": []}, "gtm_reference": null},
            {"id": 11, "step_url": thanks, "step_code": "T", "post_message": true,
             "shopping_cart": null, "gtm_reference": {"event": "done"}}
        ],
        "routes": [
            {"id": 1, "fromstep_id": null, "nextstep_id": 10, "route_config": null},
            {"id": 2, "fromstep_id": 10, "nextstep_id": 11, "route_config": {"when": "ok"}},
            {"id": 3, "fromstep_id": 11, "nextstep_id": 99, "route_config": null}
        ]
    })
}

#[test]
fn import_then_export_preserves_topology() {
    let Some(store) = pg_store() else { return };
    let product_id = unique_product_id();
    with_pool(|pool| insert_product(pool, product_id, "PG"));
    let name = unique("Funnel");
    let landing = unique("/landing");
    let thanks = unique("/thanks");

    let report = import_document(&store, &document(&name, product_id, &landing, &thanks), false).expect("import");
    assert!(report.created);
    assert_eq!(report.steps_imported, 2);
    assert_eq!(report.routes_imported, 2);
    assert_eq!(report.routes_skipped, 1);

    let snap = export_funnel(&store, report.funnel_id).expect("export");
    assert_eq!(snap.funnel.name.as_deref(), Some(name.as_str()));
    assert_eq!(snap.funnel.product.code.as_deref(), Some("PG"));
    let urls: Vec<&str> = snap.steps.iter().map(|s| s.step_url.as_str()).collect();
    assert_eq!(urls, vec![landing.as_str(), thanks.as_str()]);
    assert_eq!(snap.routes.len(), 2);
    let thanks_step = snap.steps.iter().find(|s| s.step_url == thanks).unwrap();
    assert_eq!(thanks_step.gtm_reference, Some(json!({"event": "done"})));
}

#[test]
fn reimport_with_update_keeps_one_funnel_per_product() {
    let Some(store) = pg_store() else { return };
    let product_id = unique_product_id();
    let name = unique("Funnel");
    let doc = document(&name, product_id, &unique("/a"), &unique("/b"));

    let first = import_document(&store, &doc, false).expect("first import");
    let err = import_document(&store, &doc, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let second = import_document(&store, &doc, true).expect("update");
    assert!(!second.created);
    assert_eq!(second.funnel_id, first.funnel_id);
    assert_eq!(second.workflow_id, first.workflow_id);

    let funnels = store.with_session(|s| Ok(s.funnels_by_product(product_id)?)).unwrap();
    assert_eq!(funnels.len(), 1);
    let routes = store.with_session(|s| Ok(s.routes_for_workflow(first.workflow_id)?)).unwrap();
    assert_eq!(routes.len(), 2);
}

#[test]
fn failed_import_leaves_no_rows_behind() {
    let Some(store) = pg_store() else { return };
    let taken = unique("Taken");
    import_document(&store, &document(&taken, unique_product_id(), &unique("/x"), &unique("/y")), false).expect("seed");

    // Otro producto con el mismo nombre: choca con la unicidad del nombre
    // después de insertar el workflow.
    let doc = document(&taken, unique_product_id(), &unique("/landing"), &unique("/z"));
    let err = import_document(&store, &doc, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let workflows = with_pool(|pool| {
                        let mut conn = pool.get().expect("conn");
                        diesel::sql_query("SELECT COUNT(*) AS count FROM funnel_manager.workflow WHERE description = $1")
                            .bind::<Text, _>(format!("{taken} workflow"))
                            .get_result::<Count>(&mut conn)
                            .expect("count")
                            .count
                    }).expect("pool");
    assert_eq!(workflows, 1, "the workflow of the failed import must be rolled back");
}

#[test]
fn design_built_through_the_catalog_is_exported() {
    let Some(store) = pg_store() else { return };
    let product_id = unique_product_id();
    with_pool(|pool| insert_product(pool, product_id, "DS"));
    let landing = unique("/landing");
    let report = import_document(&store, &document(&unique("Design"), product_id, &landing, &unique("/t")), false)
        .expect("import");
    let step_id = store.with_session(|s| Ok(s.step_by_url(&landing)?)).unwrap().expect("step").id;

    let section = catalog::create_section(&store, "hero").unwrap();
    let component = catalog::create_component(&store, "button").unwrap();
    catalog::attach_section_to_step(&store, step_id, section, SectionPlacement::default()).unwrap();
    let attached = catalog::attach_component_to_section(&store, component, section, 1).unwrap();
    catalog::set_cms_key(&store, attached.structure_link_id, json!({"label": "Buy"})).unwrap();

    let snap = export_funnel(&store, report.funnel_id).expect("export");
    let design = snap.design.as_ref().expect("design");
    assert!(design.sections.iter().any(|s| s.id == section && s.stepid == Some(step_id)));
    assert!(design.components.iter().any(|c| c.component_section_id == Some(attached.component_section_id)));
    assert!(design.cms_keys.iter().any(|k| k.value == json!({"label": "Buy"})));
}

#[test]
fn detach_keeps_a_structure_still_linked_elsewhere() {
    let Some(store) = pg_store() else { return };
    let section = catalog::create_section(&store, "form").unwrap();
    let input = catalog::create_component(&store, "input").unwrap();
    let button = catalog::create_component(&store, "button").unwrap();
    let first = catalog::attach_component_to_section(&store, input, section, 1).unwrap();
    let second = catalog::attach_component_to_section(&store, button, section, 2).unwrap();
    store.with_transaction(|s| {
             Ok(s.upsert_structure_link(&StructureComponentSection { id: second.structure_link_id,
                                                                     component_sectionid: second.component_section_id,
                                                                     structureid: first.structure_id,
                                                                     order: 0 })?)
         })
         .unwrap();

    catalog::detach_component(&store, first.component_section_id).expect("detach with shared structure");

    let structures = store.with_session(|s| Ok(s.structures_by_ids(&[first.structure_id])?)).unwrap();
    assert_eq!(structures.len(), 1);
    let kept = store.with_session(|s| Ok(s.structure_link_by_id(second.structure_link_id)?)).unwrap();
    assert_eq!(kept.map(|l| l.structureid), Some(first.structure_id));
}
