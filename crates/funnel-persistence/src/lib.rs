//! funnel-persistence
//!
//! Implementación Postgres (Diesel + r2d2) de `FunnelStore`.
//!
//! Módulos:
//! - `pg`: pool, proveedor de conexiones y `PgFunnelStore`.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel de los esquemas `funnel_manager`, `design` y
//!   `product`.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgFunnelStore, PgPool, PoolProvider};
