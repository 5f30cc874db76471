//! Implementación Postgres (Diesel) de `FunnelStore`.
//!
//! - `PgFunnelStore` toma una conexión del proveedor por cada llamada a
//!   `with_session`/`with_transaction` y la devuelve al pool al terminar.
//! - Las transacciones son `read_write`; cualquier `Err` del closure hace
//!   rollback completo.
//! - El checkout de conexiones se reintenta ante errores transitorios. Las
//!   transacciones no se reintentan: el closure del llamador es `FnOnce`.

mod rows;
mod session;

use std::thread;
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use funnel_core::{FunnelSession, FunnelStore, StoreError, TransferError};
use log::{debug, warn};

pub use session::PgSession;

use crate::error::{store_err, PersistenceError};
use crate::migrations::run_pending_migrations;

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo con [`build_pool`] se corren las migraciones pendientes.
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Conexión tomada del pool.
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Contrato: devuelve una conexión válida o `PersistenceError::TransientIo`.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// `ConnectionProvider` respaldado por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Política de reintento del checkout de conexiones.
///
/// Solo cubre la obtención de la conexión: un pool agotado o un servidor que
/// todavía no acepta conexiones. Lo que ocurra después ya no se reintenta.
#[derive(Debug, Clone, Copy)]
struct CheckoutRetry {
    retries: u32,
    step: Duration,
}

impl Default for CheckoutRetry {
    fn default() -> Self {
        Self { retries: 3,
               step: Duration::from_millis(15) }
    }
}

impl CheckoutRetry {
    /// Fallos de checkout que pueden resolverse esperando.
    fn is_transient(err: &PersistenceError) -> bool {
        match err {
            PersistenceError::TransientIo(_) => true,
            PersistenceError::Unknown(msg) => {
                let m = msg.to_lowercase();
                m.contains("connection refused") || m.contains("connection closed") || m.contains("timed out")
            }
            _ => false,
        }
    }

    /// Pide una conexión a `checkout`, esperando `step * intento` entre
    /// fallos transitorios.
    fn run<T, F>(self, mut checkout: F) -> Result<T, PersistenceError>
        where F: FnMut() -> Result<T, PersistenceError>
    {
        let mut attempt = 0;
        loop {
            match checkout() {
                Err(e) if Self::is_transient(&e) && attempt < self.retries => {
                    attempt += 1;
                    let wait = self.step * attempt;
                    warn!("connection checkout failed ({attempt}/{}): {e}; retrying in {}ms",
                          self.retries,
                          wait.as_millis());
                    thread::sleep(wait);
                }
                Err(e) => {
                    if attempt > 0 {
                        warn!("connection checkout gave up after {attempt} retries: {e}");
                    }
                    return Err(e);
                }
                ok => return ok,
            }
        }
    }
}

/// Motivo de abortar una transacción Diesel: un error de negocio devuelto por
/// el closure o un error de la propia base (BEGIN/COMMIT).
enum TxAbort {
    Transfer(TransferError),
    Db(diesel::result::Error),
}

impl From<diesel::result::Error> for TxAbort {
    fn from(err: diesel::result::Error) -> Self {
        TxAbort::Db(err)
    }
}

impl From<TxAbort> for TransferError {
    fn from(abort: TxAbort) -> Self {
        match abort {
            TxAbort::Transfer(err) => err,
            TxAbort::Db(err) => TransferError::Database(store_err(err)),
        }
    }
}

/// `FunnelStore` sobre Postgres.
pub struct PgFunnelStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgFunnelStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    fn checkout(&self) -> Result<PgPooledConnection, TransferError> {
        CheckoutRetry::default().run(|| self.provider.connection())
                                .map_err(|e| TransferError::Database(StoreError::from(e)))
    }
}

impl PgFunnelStore<PoolProvider> {
    /// Atajo: store sobre un pool ya construido.
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolProvider { pool })
    }
}

impl<P: ConnectionProvider> FunnelStore for PgFunnelStore<P> {
    fn with_session<T, F>(&self, f: F) -> Result<T, TransferError>
        where F: FnOnce(&mut dyn FunnelSession) -> Result<T, TransferError>
    {
        let mut conn = self.checkout()?;
        let mut session = PgSession::new(&mut conn);
        f(&mut session)
    }

    fn with_transaction<T, F>(&self, f: F) -> Result<T, TransferError>
        where F: FnOnce(&mut dyn FunnelSession) -> Result<T, TransferError>
    {
        let mut conn = self.checkout()?;
        debug!("transaction:start");
        let result = conn.build_transaction()
                         .read_write()
                         .run(|tx_conn| {
                             let mut session = PgSession::new(tx_conn);
                             f(&mut session).map_err(TxAbort::Transfer)
                         })
                         .map_err(TransferError::from);
        match &result {
            Ok(_) => debug!("transaction:commit"),
            Err(e) => debug!("transaction:rollback err={e}"),
        }
        result
    }
}

/// Construye un pool Postgres r2d2 a partir de URL y corre las migraciones
/// pendientes sobre la primera conexión.
///
/// Tamaños en 0 se elevan a 1; si `min_size > max_size` se usa `min = max`.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = min_size.max(1);
    let validated_max = max_size.max(1);
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), using min = max", validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Carga `.env`, lee `DbConfig` y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> CheckoutRetry {
        CheckoutRetry { retries: 3,
                        step: Duration::from_millis(1) }
    }

    #[test]
    fn only_connection_failures_are_transient() {
        assert!(CheckoutRetry::is_transient(&PersistenceError::TransientIo("pool timed out".into())));
        assert!(CheckoutRetry::is_transient(&PersistenceError::Unknown("Connection refused (os error 111)".into())));
        assert!(!CheckoutRetry::is_transient(&PersistenceError::SerializationConflict));
        assert!(!CheckoutRetry::is_transient(&PersistenceError::UniqueViolation("step_url".into())));
        assert!(!CheckoutRetry::is_transient(&PersistenceError::Config("DATABASE_URL is not set".into())));
    }

    #[test]
    fn checkout_gives_up_after_the_configured_retries() {
        let mut calls = 0;
        let res: Result<(), _> = quick().run(|| {
                                            calls += 1;
                                            Err(PersistenceError::TransientIo("down".into()))
                                        });
        assert!(matches!(res, Err(PersistenceError::TransientIo(_))));
        assert_eq!(calls, 4);
    }

    #[test]
    fn checkout_recovers_once_the_pool_answers() {
        let mut calls = 0;
        let res = quick().run(|| {
                             calls += 1;
                             if calls < 3 {
                                 Err(PersistenceError::TransientIo("busy".into()))
                             } else {
                                 Ok(calls)
                             }
                         });
        assert_eq!(res.unwrap(), 3);
    }

    #[test]
    fn permanent_checkout_errors_are_not_repeated() {
        let mut calls = 0;
        let res: Result<(), _> = quick().run(|| {
                                            calls += 1;
                                            Err(PersistenceError::Config("bad url".into()))
                                        });
        assert!(matches!(res, Err(PersistenceError::Config(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn business_aborts_pass_through_unchanged() {
        let err = TransferError::from(TxAbort::Transfer(TransferError::Validation("bad".into())));
        assert!(matches!(err, TransferError::Validation(m) if m == "bad"));
        let err = TransferError::from(TxAbort::Db(diesel::result::Error::NotFound));
        assert!(matches!(err, TransferError::Database(StoreError::NotFound)));
    }
}
