//! Process-wide relay state: the relay table, the master readiness set, and the
//! relay task handle, wrapped in one value created at startup and torn down
//! explicitly, instead of implicit statics.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::sync::Mutex;
use tokio::sync::Notify as ShutdownNotify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::backend::RelayBackend;
use crate::config::RelayConfig;
use crate::readiness::ReadinessSet;
use crate::table::RelayTable;
use crate::wakeup::Wakeup;

/// The relay table and master readiness set behind one lock: they are the only
/// mutably shared state and are always mutated together. An async-aware lock
/// (not `std::sync::Mutex`) so a backend's socket-bind / firewall upcall can run
/// while the lock is held — they are fast and bounded, which is exactly the case
/// `tokio::sync::Mutex` is for.
pub(crate) struct Inner {
    pub table: RelayTable,
    pub readiness: ReadinessSet,
}

/// Top-level handle. Construct with [`RelayService::new`], run the relay loop with
/// [`RelayService::spawn_relay_loop`], and tear both down with
/// [`RelayService::shutdown`].
pub struct RelayService {
    pub(crate) config: RelayConfig,
    pub(crate) inner: Mutex<Inner>,
    pub(crate) wakeup: Wakeup,
    pub(crate) backend: Arc<dyn RelayBackend>,
    pub(crate) shutdown: ShutdownNotify,
    relay_task: StdMutex<Option<JoinHandle<()>>>,
}

impl RelayService {
    pub fn new(config: RelayConfig, backend: Arc<dyn RelayBackend>) -> Arc<Self> {
        let capacity = config.rtp_table_size;
        Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                table: RelayTable::new(capacity),
                readiness: ReadinessSet::empty(),
            }),
            wakeup: Wakeup::new(),
            backend,
            shutdown: ShutdownNotify::new(),
            relay_task: StdMutex::new(None),
        })
    }

    /// Spawn the single dedicated relay task. Idempotent only in the sense
    /// that calling it twice spawns two loops racing on the same mutex — callers
    /// are expected to call this exactly once — there is only ever one relay task
    /// per service.
    pub fn spawn_relay_loop(self: &Arc<Self>) {
        let service = self.clone();
        let handle = tokio::spawn(async move {
            crate::relay_loop::run(service).await;
        });
        *self.relay_task.lock().unwrap() = Some(handle);
    }

    /// Cancel the relay task at its next wait point and join it.
    pub async fn shutdown(&self) {
        info!("relay service shutting down");
        self.shutdown.notify_one();
        let handle = self.relay_task.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Number of occupied slots across the whole table. For tests and basic
    /// observability; the relay loop and control surface never consult it.
    pub async fn active_slot_count(&self) -> usize {
        self.inner.lock().await.table.active_count()
    }
}
