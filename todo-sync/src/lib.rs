//! Keeps a local, ordered copy of a ledger-backed todo list in sync with the ledger.
//!
//! Data flow:
//! 1. The ledger pushes change notifications through an [`EventSource`]. The [`ChainListener`] decodes them and
//!    dispatches typed payloads on a shared [`EventBus`].
//! 2. The [`TodoReconciler`] subscribes to those payloads and patches its collection, which it seeded from a
//!    bulk read through a [`SnapshotReader`].
//! 3. Presentation code reads [`TodoReconciler::get_collection`] and listens for changes.
//!
//! The bus is not todo-specific: UI state such as the [`theme`] rides on it too.
//!
//! Everything here is single-threaded; shared state lives behind `Rc` and no borrow is ever held across an
//! `.await` or while calling back into user code.

pub mod chain_listener;
pub mod config;
mod dirty_tracker;
pub mod events;
pub mod ledger;
pub mod reconciler;
pub mod status;
pub mod theme;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

#[cfg(test)]
mod testing;

use std::rc::Rc;
use std::sync::LazyLock;

pub use chain_listener::{ChainListener, DecodeError};
pub use config::{ConfigError, PreSnapshotPolicy, SyncConfig};
pub use holler::{DispatchReport, EventBus, EventKey, SubscriptionHandle};
pub use ledger::{EventSource, RawHandler, RawTodo, SnapshotReadError, SnapshotReader};
pub use reconciler::{
    ChangeListenerKey, InitOutcome, Phase, SnapshotStatus, Todo, TodoEntry, TodoId,
    TodoReconciler,
};
pub use status::{TodoStatus, decode_status};
pub use theme::{Theme, ThemeChanged, ThemeState};

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    #[cfg(target_arch = "wasm32")]
    {
        #[cfg(feature = "console_error_panic_hook")]
        console_error_panic_hook::set_once();

        wasm_logger::init(wasm_logger::Config::default());
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let env = env_logger::Env::default().default_filter_or("info");
        if let Err(e) = env_logger::Builder::from_env(env).try_init() {
            // someone else (usually a test harness) got there first
            eprintln!("Logger already initialized: {e}");
        }
    }

    log::info!("Logging initialized");
});

pub fn init_logging() {
    LazyLock::force(&LOGGER);
}

/// One session's worth of sync: a reconciler and a chain listener sharing a bus, mounted and unmounted together.
pub struct TodoSync<S: EventSource> {
    bus: Rc<EventBus>,
    reconciler: TodoReconciler,
    listener: ChainListener<S>,
}

impl<S: EventSource> TodoSync<S> {
    pub fn new(bus: Rc<EventBus>, source: Rc<S>, config: &SyncConfig) -> Self {
        Self {
            reconciler: TodoReconciler::new(bus.clone(), config),
            listener: ChainListener::new(bus.clone(), source),
            bus,
        }
    }

    /// Subscribes the reconciler, then attaches to the ledger, then reads the snapshot. The order matters:
    /// attaching first would let notifications reach a bus nobody is listening to yet.
    pub async fn mount<R: SnapshotReader>(&self, reader: &R) -> InitOutcome {
        self.reconciler.activate();
        self.listener.attach();
        self.reconciler.initialize(reader).await
    }

    /// Safe to call repeatedly, and before `mount`.
    pub fn unmount(&self) {
        self.listener.detach();
        self.reconciler.teardown();
    }

    pub fn todos(&self) -> Vec<Todo> {
        self.reconciler.get_collection()
    }

    pub fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    pub fn reconciler(&self) -> &TodoReconciler {
        &self.reconciler
    }

    pub fn listener(&self) -> &ChainListener<S> {
        &self.listener
    }
}
