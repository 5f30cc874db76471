//! funnel-core: export/import de funnels sobre un almacenamiento abstracto.
pub mod catalog;
pub mod errors;
pub mod export;
pub mod import;
pub mod store;
pub mod transfer;

pub use catalog::{ComponentAttachment, SectionPlacement};
pub use errors::{ErrorKind, StoreError, StoreResult, TransferError};
pub use export::export_funnel;
pub use import::{import_document, import_snapshot, insert_or_recover, DesignCounts, ImportReport};
pub use store::{DesignTable, FunnelSession, FunnelStore, InMemoryFunnelStore, NewFunnel, NewRoute, NewStep};
pub use transfer::{download_filename, error_document, parse_upload, read_snapshot, sanitize_name, to_pretty_json, SnapshotSummary};
