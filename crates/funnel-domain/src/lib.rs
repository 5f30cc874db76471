// funnel-domain library entry point
pub mod entities;
pub mod error;
pub mod json_field;
pub mod snapshot;
pub use entities::{CmsKey, Component, ComponentSection, EntityId, Funnel, Product, Route, Section, Step, StepFields, StepSection, Structure,
                   StructureComponentSection, Workflow};
pub use error::DomainError;
pub use json_field::{decode_column, encode_column, JsonFallback};
pub use snapshot::{CmsKeyItem, ComponentItem, DesignSnapshot, FunnelSnapshot, ProductSnapshot, RouteSnapshot, SectionItem, Snapshot,
                   SnapshotMetadata, StepSnapshot, StructureItem, WorkflowSnapshot, SNAPSHOT_VERSION};
