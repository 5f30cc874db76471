//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    product.products (id) {
        id -> BigInt,
        product_code -> Text,
        title_prod -> Nullable<Text>,
    }
}

diesel::table! {
    funnel_manager.workflow (id) {
        id -> BigInt,
        description -> Nullable<Text>,
    }
}

diesel::table! {
    funnel_manager.funnel (id) {
        id -> BigInt,
        name -> Nullable<Text>,
        broker_id -> Nullable<BigInt>,
        product_id -> Nullable<BigInt>,
        workflow_id -> Nullable<BigInt>,
    }
}

diesel::table! {
    funnel_manager.step (id) {
        id -> BigInt,
        step_url -> Text,
        step_code -> Nullable<Text>,
        post_message -> Bool,
        shopping_cart -> Nullable<Jsonb>,
        gtm_reference -> Nullable<Jsonb>,
    }
}

diesel::table! {
    funnel_manager.route (id) {
        id -> BigInt,
        workflow_id -> BigInt,
        fromstep_id -> Nullable<BigInt>,
        nextstep_id -> BigInt,
        route_config -> Nullable<Jsonb>,
    }
}

diesel::table! {
    design.section (id) {
        id -> BigInt,
        sectiontype -> Text,
    }
}

diesel::table! {
    design.component (id) {
        id -> BigInt,
        component_type -> Text,
    }
}

diesel::table! {
    design.structure (id) {
        id -> BigInt,
        data -> Jsonb,
    }
}

diesel::table! {
    design.step_section (id) {
        id -> BigInt,
        order -> Integer,
        sectionid -> BigInt,
        stepid -> BigInt,
        productid -> Nullable<BigInt>,
        brokerid -> Nullable<BigInt>,
        authorized -> Bool,
    }
}

diesel::table! {
    design.component_section (id) {
        id -> BigInt,
        componentid -> BigInt,
        sectionid -> BigInt,
        order -> Integer,
    }
}

diesel::table! {
    design.structure_component_section (id) {
        id -> BigInt,
        component_sectionid -> BigInt,
        structureid -> BigInt,
        order -> Integer,
    }
}

diesel::table! {
    design.cms_key (id) {
        id -> BigInt,
        value -> Jsonb,
        structurecomponentsectionid -> BigInt,
    }
}

diesel::joinable!(funnel -> workflow (workflow_id));
diesel::joinable!(route -> workflow (workflow_id));
diesel::joinable!(step_section -> section (sectionid));
diesel::joinable!(step_section -> step (stepid));
diesel::joinable!(component_section -> component (componentid));
diesel::joinable!(structure_component_section -> component_section (component_sectionid));
diesel::joinable!(structure_component_section -> structure (structureid));
diesel::joinable!(cms_key -> structure_component_section (structurecomponentsectionid));

diesel::allow_tables_to_appear_in_same_query!(
    products,
    workflow,
    funnel,
    step,
    route,
    section,
    component,
    structure,
    step_section,
    component_section,
    structure_component_section,
    cms_key,
);
