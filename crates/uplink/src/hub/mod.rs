//! Hub: admits validators, dispatches checks, records attested results.
//!
//! Shared state is split in two independently locked structures, the
//! [`ValidatorRegistry`] and the [`CallbackTable`]. Sessions, the dispatcher
//! and the sweeper all work through them concurrently.

pub mod callbacks;
pub mod dispatch;
pub mod memory;
pub mod registry;
pub mod session;
pub mod storage;

pub use callbacks::{CallbackTable, PendingCallback};
pub use dispatch::{Dispatcher, TickSummary};
pub use memory::MemoryStorage;
pub use registry::{ConnectedValidator, ConnectionHandle, ValidatorRegistry};
pub use session::{HubSession, SessionContext, SessionState};
pub use storage::{HubStorage, MonitoredTarget, NewTick, Tick, Validator};

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::DispatchConfig;

/// The coordinator process
pub struct Hub {
    config: DispatchConfig,
    storage: Arc<dyn HubStorage>,
    registry: Arc<ValidatorRegistry>,
    callbacks: Arc<CallbackTable>,
}

impl Hub {
    pub fn new(storage: Arc<dyn HubStorage>, config: DispatchConfig) -> Self {
        Self {
            config,
            storage,
            registry: Arc::new(ValidatorRegistry::new()),
            callbacks: Arc::new(CallbackTable::new()),
        }
    }

    pub fn registry(&self) -> Arc<ValidatorRegistry> {
        self.registry.clone()
    }

    pub fn callbacks(&self) -> Arc<CallbackTable> {
        self.callbacks.clone()
    }

    /// Accept validators on `listener` and dispatch checks until the task is dropped
    pub async fn run(self, listener: TcpListener) {
        let dispatcher = Arc::new(Dispatcher::new(
            self.storage.clone(),
            self.registry.clone(),
            self.callbacks.clone(),
            self.config.clone(),
        ));
        let dispatch_handle = dispatcher.start();
        let sweep_handle = self.callbacks.clone().start_sweeper(self.config.sweep_interval());

        let ctx = SessionContext {
            storage: self.storage,
            registry: self.registry,
            callbacks: self.callbacks,
        };

        if let Ok(addr) = listener.local_addr() {
            info!("Hub listening for validators on {addr}");
        }

        // Aborts background tasks when `run` is dropped
        let _guard = AbortOnDrop(vec![dispatch_handle, sweep_handle]);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    tokio::spawn(session::serve_connection(stream, peer, ctx.clone()));
                }
                Err(e) => warn!("Failed to accept connection: {e}"),
            }
        }
    }
}

struct AbortOnDrop(Vec<tokio::task::JoinHandle<()>>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}
