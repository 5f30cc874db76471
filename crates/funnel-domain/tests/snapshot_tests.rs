use funnel_domain::{DomainError, Snapshot};
use serde_json::json;

fn minimal_doc() -> serde_json::Value {
    json!({
        "funnel": {"name": "F", "broker_id": 1, "product": {"id": 42, "code": "P42", "name": "Prod"}},
        "workflow": {"description": "W"},
        "steps": [{"id": 1, "step_url": "/a", "step_code": "A", "post_message": false, "shopping_cart": null, "gtm_reference": null}],
        "routes": [{"id": 1, "fromstep_id": null, "nextstep_id": 1, "route_config": null}]
    })
}

#[test]
fn minimal_document_is_accepted() {
    let snap = Snapshot::from_document(&minimal_doc()).expect("valid snapshot");
    assert_eq!(snap.funnel.id, None);
    assert_eq!(snap.funnel.product.id, 42);
    assert_eq!(snap.steps.len(), 1);
    assert_eq!(snap.routes[0].fromstep_id, None);
    assert_eq!(snap.routes[0].nextstep_id, Some(1));
    assert!(snap.design.is_none());
    assert!(!snap.has_design());
}

#[test]
fn each_required_key_is_reported_by_name() {
    for key in ["funnel", "workflow", "steps", "routes"] {
        let mut doc = minimal_doc();
        doc.as_object_mut().unwrap().remove(key);
        let err = Snapshot::from_document(&doc).unwrap_err();
        assert_eq!(err, DomainError::MissingField(key));
        assert!(err.to_string().contains(key), "el mensaje debe nombrar la clave: {err}");
    }
}

#[test]
fn product_id_is_required() {
    let mut doc = minimal_doc();
    doc["funnel"]["product"] = json!({"code": "P42"});
    assert_eq!(Snapshot::from_document(&doc).unwrap_err(), DomainError::MissingField("funnel.product.id"));
}

#[test]
fn non_object_document_is_rejected() {
    let err = Snapshot::from_document(&json!([1, 2, 3])).unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[test]
fn wrongly_typed_field_is_a_validation_error() {
    let mut doc = minimal_doc();
    doc["steps"] = json!("not a list");
    assert!(matches!(Snapshot::from_document(&doc), Err(DomainError::ValidationError(_))));
}

#[test]
fn null_flags_and_orders_fall_back_to_defaults() {
    let mut doc = minimal_doc();
    doc["steps"][0]["post_message"] = json!(null);
    doc["design"] = json!({
        "sections": [{"id": 5, "sectiontype": "header", "step_section_id": 9, "order": null, "stepid": 1, "productid": null}]
    });
    let snap = Snapshot::from_document(&doc).expect("valid");
    assert!(!snap.steps[0].post_message);
    let design = snap.design.as_ref().expect("design");
    assert_eq!(design.sections[0].order, 0);
    assert!(design.components.is_empty());
    assert!(snap.has_design());
}

#[test]
fn empty_design_section_counts_as_absent() {
    let mut doc = minimal_doc();
    doc["design"] = json!({"sections": [], "components": [], "structures": [], "cms_keys": []});
    let snap = Snapshot::from_document(&doc).expect("valid");
    assert!(snap.design.is_some());
    assert!(!snap.has_design());
}

#[test]
fn serialized_json_blobs_stay_native() {
    let mut doc = minimal_doc();
    doc["steps"][0]["shopping_cart"] = json!({"items": [{"sku": "X"}]});
    let snap = Snapshot::from_document(&doc).expect("valid");
    let out = serde_json::to_value(&snap).expect("serialize");
    assert!(out["steps"][0]["shopping_cart"].is_object(), "no debe quedar como string JSON");
    assert!(out.get("design").is_none());
}
