use funnel_core::{catalog, export_funnel, import_document, import_snapshot, insert_or_recover, ErrorKind, FunnelStore, InMemoryFunnelStore,
                  NewStep};
use funnel_domain::{Snapshot, StepFields};
use serde_json::json;
use test_support::{add_product, funnel_count, new_funnel, scenario_doc, seed, step_count, PRODUCT_ID};

#[test]
fn concrete_scenario_against_empty_store() {
    let store = InMemoryFunnelStore::new();
    add_product(&store, PRODUCT_ID);

    let report = import_document(&store, &scenario_doc(), false).expect("import");
    assert_eq!(report.steps_imported, 1);
    assert_eq!(report.routes_imported, 1);
    assert_eq!(report.routes_skipped, 0);
    assert!(report.created);
    assert_eq!(report.message, "Funnel imported");
    assert_eq!(report.design_imported, None);

    let snap = export_funnel(&store, report.funnel_id).expect("export");
    assert_eq!(snap.steps.len(), 1);
    assert_eq!(snap.steps[0].step_url, "/a");
    assert_eq!(snap.steps[0].step_code.as_deref(), Some("A"));
    assert_eq!(snap.routes.len(), 1);
    assert_eq!(snap.routes[0].fromstep_id, None);
    assert_eq!(snap.funnel.name.as_deref(), Some("F"));
    assert_eq!(snap.workflow.description.as_deref(), Some("W"));
}

#[test]
fn round_trip_with_update_is_idempotent() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let before = export_funnel(&store, seeded.funnel_id).expect("export");
    let funnels = funnel_count(&store);
    let steps = step_count(&store);

    let report = import_snapshot(&store, &before, true).expect("re-import");
    assert_eq!(report.funnel_id, seeded.funnel_id);
    assert_eq!(report.workflow_id, seeded.workflow_id);
    assert!(!report.created);
    assert_eq!(report.message, "Funnel updated");
    assert_eq!(report.steps_imported, before.steps.len());
    assert_eq!(report.routes_imported, before.routes.len());

    let after = export_funnel(&store, seeded.funnel_id).expect("export again");
    assert_eq!(after.funnel.name, before.funnel.name);
    assert_eq!(after.steps, before.steps);
    assert_eq!(after.routes.len(), before.routes.len());
    assert_eq!(after.design.as_ref().map(|d| d.sections.clone()), before.design.as_ref().map(|d| d.sections.clone()));
    assert_eq!(after.design.as_ref().map(|d| d.cms_keys.clone()), before.design.as_ref().map(|d| d.cms_keys.clone()));
    assert_eq!(funnel_count(&store), funnels);
    assert_eq!(step_count(&store), steps);
}

#[test]
fn update_never_duplicates_the_funnel() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let mut doc = scenario_doc();
    doc["funnel"]["name"] = json!("Renamed");
    doc["funnel"]["broker_id"] = json!(9);

    let report = import_document(&store, &doc, true).expect("import");
    assert_eq!(report.funnel_id, seeded.funnel_id);
    assert_eq!(funnel_count(&store), 1);

    let snap = export_funnel(&store, seeded.funnel_id).unwrap();
    assert_eq!(snap.funnel.name.as_deref(), Some("Renamed"));
    assert_eq!(snap.funnel.broker_id, Some(9));
    assert_eq!(snap.workflow.description.as_deref(), Some("W"));
    // Las rutas del workflow se reemplazan por las del snapshot.
    assert_eq!(snap.routes.len(), 1);
    assert_eq!(snap.steps[0].step_url, "/a");
}

#[test]
fn absent_product_creates_a_new_funnel() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let mut doc = scenario_doc();
    doc["funnel"]["product"]["id"] = json!(77);
    doc["funnel"]["name"] = json!("Brand new");

    let report = import_document(&store, &doc, true).expect("import");
    assert!(report.created);
    assert_ne!(report.funnel_id, seeded.funnel_id);
    assert_ne!(report.workflow_id, seeded.workflow_id);
    assert_eq!(funnel_count(&store), 2);
}

#[test]
fn existing_step_url_is_reused_not_duplicated() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    add_product(&store, 77);
    let steps = step_count(&store);
    let mut doc = scenario_doc();
    doc["funnel"]["product"]["id"] = json!(77);
    doc["steps"][0]["step_url"] = json!("/form");
    doc["steps"][0]["id"] = json!(500);
    doc["routes"][0]["nextstep_id"] = json!(500);

    let report = import_document(&store, &doc, false).expect("import");
    assert_eq!(report.steps_imported, 1);
    assert_eq!(report.routes_imported, 1);
    assert_eq!(step_count(&store), steps);

    let snap = export_funnel(&store, report.funnel_id).unwrap();
    assert_eq!(snap.steps[0].id, seeded.form);
    assert_eq!(snap.steps[0].step_code.as_deref(), Some("A"));
}

#[test]
fn insert_or_recover_reuses_the_row_that_won() {
    let store = InMemoryFunnelStore::new();
    let existing = catalog::create_step(&store, "/race", StepFields::default()).unwrap();

    let id = store.with_transaction(|s| {
                      insert_or_recover(s,
                                        &NewStep { step_url: "/race".into(),
                                                   fields: StepFields { step_code: Some("R".into()),
                                                                        ..Default::default() } })
                  })
                  .expect("recovered");
    assert_eq!(id, existing);
    let step = store.with_session(|s| Ok(s.step_by_id(id)?)).unwrap().unwrap();
    assert_eq!(step.step_code.as_deref(), Some("R"));
}

#[test]
fn dangling_routes_are_skipped_with_a_warning() {
    let store = InMemoryFunnelStore::new();
    add_product(&store, PRODUCT_ID);
    let mut doc = scenario_doc();
    doc["routes"] = json!([
        {"id": 1, "fromstep_id": null, "nextstep_id": 1},
        {"id": 2, "fromstep_id": 1, "nextstep_id": 99},
        {"id": 3, "fromstep_id": 98, "nextstep_id": 1},
        {"id": 4, "fromstep_id": 1, "nextstep_id": null}
    ]);

    let report = import_document(&store, &doc, false).expect("import must not fail");
    assert_eq!(report.routes_imported, 1);
    assert_eq!(report.routes_skipped, 3);
    assert_eq!(report.warnings.iter().filter(|w| w.contains("skipped")).count(), 3);
    assert_eq!(export_funnel(&store, report.funnel_id).unwrap().routes.len(), 1);
}

#[test]
fn duplicate_routes_are_imported_as_is() {
    let store = InMemoryFunnelStore::new();
    let mut doc = scenario_doc();
    doc["routes"] = json!([
        {"id": 1, "fromstep_id": null, "nextstep_id": 1},
        {"id": 2, "fromstep_id": null, "nextstep_id": 1}
    ]);

    let report = import_document(&store, &doc, false).expect("import");
    assert_eq!(report.routes_imported, 2);
    assert!(report.warnings.iter().any(|w| w.contains("duplicates")));
}

#[test]
fn malformed_documents_fail_before_touching_the_store() {
    let store = InMemoryFunnelStore::new();
    let err = funnel_core::parse_upload(b"{\"funnel\": ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut doc = scenario_doc();
    doc.as_object_mut().unwrap().remove("routes");
    let err = import_document(&store, &doc, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("routes"));
    assert_eq!(funnel_count(&store), 0);
}

#[test]
fn existing_funnel_without_update_flag_is_a_conflict() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let before = export_funnel(&store, seeded.funnel_id).unwrap();

    let err = import_document(&store, &scenario_doc(), false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.to_string().contains(&seeded.funnel_id.to_string()));

    let after = export_funnel(&store, seeded.funnel_id).unwrap();
    assert_eq!(after.funnel, before.funnel);
    assert_eq!(after.routes.len(), before.routes.len());
    assert_eq!(step_count(&store), 4);
}

#[test]
fn failure_mid_import_rolls_everything_back() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    add_product(&store, 8);
    new_funnel(&store, "Taken", 8);
    let before = export_funnel(&store, seeded.funnel_id).unwrap();

    // El rename choca con el nombre único después de borrar rutas y
    // actualizar el workflow: nada de eso debe persistir.
    let mut doc = scenario_doc();
    doc["funnel"]["name"] = json!("Taken");
    doc["workflow"]["description"] = json!("changed");
    let err = import_document(&store, &doc, true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let after = export_funnel(&store, seeded.funnel_id).unwrap();
    assert_eq!(after.workflow.description, before.workflow.description);
    assert_eq!(after.routes.len(), 3);
    assert_eq!(after.steps, before.steps);
}

#[test]
fn funnel_id_takes_precedence_over_product_lookup() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let (other, _) = new_funnel(&store, "Other", PRODUCT_ID);
    let mut doc = scenario_doc();
    doc["funnel"]["id"] = json!(other);
    doc["funnel"]["name"] = json!("Other");

    let report = import_document(&store, &doc, true).unwrap();
    assert_eq!(report.funnel_id, other);
    assert!(report.warnings.is_empty());
    assert_eq!(export_funnel(&store, seeded.funnel_id).unwrap().routes.len(), 3);
}

#[test]
fn ambiguous_product_updates_the_first_funnel_and_warns() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    new_funnel(&store, "Second", PRODUCT_ID);
    let mut doc = scenario_doc();
    doc["funnel"]["name"] = json!("Spring");

    let report = import_document(&store, &doc, true).unwrap();
    assert_eq!(report.funnel_id, seeded.funnel_id);
    assert!(report.warnings.iter().any(|w| w.contains("2 funnels target product 42")));
    assert_eq!(funnel_count(&store), 2);
}

#[test]
fn null_fields_take_defaults() {
    let store = InMemoryFunnelStore::new();
    add_product(&store, PRODUCT_ID);
    let mut doc = scenario_doc();
    doc["steps"][0]["post_message"] = json!(null);
    doc["steps"][0]["shopping_cart"] = json!(null);
    doc["routes"][0]["route_config"] = json!({"weight": 3});

    let report = import_document(&store, &doc, false).unwrap();
    let step = store.with_session(|s| Ok(s.step_by_url("/a")?)).unwrap().unwrap();
    assert!(!step.post_message);
    assert_eq!(step.shopping_cart, None);

    let snap = export_funnel(&store, report.funnel_id).unwrap();
    assert_eq!(snap.routes[0].route_config, Some(json!({"weight": 3})));
}

fn design_doc() -> serde_json::Value {
    let mut doc = scenario_doc();
    doc["design"] = json!({
        "sections": [
            {"id": 10, "sectiontype": "header", "step_section_id": 100, "order": 1, "stepid": 1, "productid": null},
            {"id": 11, "sectiontype": "footer", "step_section_id": 101, "order": 2, "stepid": 55, "productid": null}
        ],
        "components": [
            {"id": 20, "component_type": "button", "component_section_id": 200, "order": 1, "sectionid": 10},
            {"id": 21, "component_type": "text", "component_section_id": 201, "order": 2, "sectionid": 10}
        ],
        "structures": [
            {"id": 30, "data": {"color": "red"}, "structure_component_section_id": 300, "component_sectionid": 200, "order": 0},
            {"id": 31, "data": null, "structure_component_section_id": 301, "component_sectionid": 201, "order": 0}
        ],
        "cms_keys": [
            {"id": 40, "value": {"label": "Buy"}, "structurecomponentsectionid": 300},
            {"id": 41, "value": ["x"], "structurecomponentsectionid": 999}
        ]
    });
    doc
}

#[test]
fn design_is_upserted_by_literal_id() {
    let store = InMemoryFunnelStore::new();
    add_product(&store, PRODUCT_ID);

    let report = import_document(&store, &design_doc(), false).expect("import");
    let counts = report.design_imported.expect("design counts");
    assert_eq!(counts.sections, 2);
    assert_eq!(counts.components, 2);
    assert_eq!(counts.structures, 2);
    assert_eq!(counts.cms_keys, 1, "la cms key con link desconocido no se cuenta");
    assert!(report.warnings.iter().any(|w| w.contains("section 11")));
    assert!(report.warnings.iter().any(|w| w.contains("cms_key 41")));

    let snap = export_funnel(&store, report.funnel_id).unwrap();
    let design = snap.design.unwrap();
    assert_eq!(design.sections.len(), 1);
    assert_eq!(design.sections[0].id, 10);
    assert_eq!(design.sections[0].step_section_id, Some(100));
    let ids: Vec<i64> = design.components.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![20, 21]);
    assert_eq!(design.structures[1].data, json!({}));
    assert_eq!(design.cms_keys.len(), 1);
    assert_eq!(design.cms_keys[0].value, json!({"label": "Buy"}));
}

#[test]
fn repeated_cms_key_id_is_counted_once() {
    let store = InMemoryFunnelStore::new();
    add_product(&store, PRODUCT_ID);
    let mut doc = design_doc();
    doc["design"]["cms_keys"] = json!([
        {"id": 40, "value": {"label": "Buy"}, "structurecomponentsectionid": 300},
        {"id": 40, "value": {"label": "Buy now"}, "structurecomponentsectionid": 300}
    ]);

    let report = import_document(&store, &doc, false).expect("import");
    assert_eq!(report.design_imported.expect("design counts").cms_keys, 1);

    let design = export_funnel(&store, report.funnel_id).unwrap().design.unwrap();
    assert_eq!(design.cms_keys.len(), 1);
    assert_eq!(design.cms_keys[0].value, json!({"label": "Buy now"}));
}

#[test]
fn update_removes_associations_dropped_from_the_snapshot() {
    let store = InMemoryFunnelStore::new();
    add_product(&store, PRODUCT_ID);
    import_document(&store, &design_doc(), false).expect("first import");

    let mut doc = design_doc();
    doc["design"]["components"] = json!([
        {"id": 20, "component_type": "button", "component_section_id": 200, "order": 1, "sectionid": 10}
    ]);
    doc["design"]["structures"] = json!([
        {"id": 30, "data": {"color": "blue"}, "structure_component_section_id": 300, "component_sectionid": 200, "order": 0}
    ]);
    let report = import_document(&store, &doc, true).expect("update");
    assert!(!report.created);

    let design = export_funnel(&store, report.funnel_id).unwrap().design.unwrap();
    assert_eq!(design.components.len(), 1);
    assert_eq!(design.components[0].id, 20);
    assert_eq!(design.structures.len(), 1);
    assert_eq!(design.structures[0].data, json!({"color": "blue"}));
    assert_eq!(design.cms_keys.len(), 1);
}

#[test]
fn update_keeps_design_of_other_products() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let snap: Snapshot = export_funnel(&store, seeded.funnel_id).unwrap();

    import_snapshot(&store, &snap, true).expect("update");

    // La sección limitada al producto 7 sigue enlazada al step.
    let promo_links = store.with_session(|s| Ok(s.step_sections_for_steps(&[seeded.landing])?)).unwrap();
    assert!(promo_links.iter().any(|ss| ss.sectionid == seeded.promo && ss.productid == Some(7)));
    let banner = store.with_session(|s| Ok(s.component_section_by_id(seeded.banner.component_section_id)?)).unwrap();
    assert!(banner.is_some());
}

#[test]
fn update_reuses_steps_reachable_before_the_route_reset() {
    let store = InMemoryFunnelStore::new();
    let seeded = seed(&store);
    let mut snap = export_funnel(&store, seeded.funnel_id).unwrap();
    for step in &mut snap.steps {
        step.id += 1000;
    }
    for route in &mut snap.routes {
        route.fromstep_id = route.fromstep_id.map(|id| id + 1000);
        route.nextstep_id = route.nextstep_id.map(|id| id + 1000);
    }
    snap.design = None;

    let report = import_snapshot(&store, &snap, true).unwrap();
    assert_eq!(report.routes_imported, 3);
    let after = export_funnel(&store, seeded.funnel_id).unwrap();
    let ids: Vec<i64> = after.steps.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![seeded.landing, seeded.form, seeded.thanks]);
    assert_eq!(step_count(&store), 4);
}
