//! # TodoReconciler
//! Owns the local copy of the ledger's todo list. It starts from a bulk snapshot and then follows the four
//! mutation notifications on the bus, applying each as a positional patch.
//!
//! Lifecycle:
//! 1. [`activate`](TodoReconciler::activate) subscribes to the bus. Do this before the chain listener attaches,
//!    or notifications emitted in between are lost for good.
//! 2. [`initialize`](TodoReconciler::initialize) reads the snapshot. Until it completes the reconciler is
//!    *uninitialized*; what happens to notifications in that window is decided by [`PreSnapshotPolicy`].
//! 3. From then on it is *live* and applies every notification as it arrives.
//! 4. [`teardown`](TodoReconciler::teardown) unsubscribes, and any snapshot read still in flight is ignored
//!    when it completes.
//!
//! Positions are the ledger's indices, so a notification that was reordered around a delete patches the wrong
//! todo. The same goes for a buffered notification whose effect the snapshot already contains: replaying it
//! duplicates a created todo or deletes a second one.
//!
//! Each stored todo also gets a [`TodoId`], which stays with it as its position shifts, so presentation code
//! has something stable to key on.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use holler::{EventBus, EventKey, SubscriptionHandle};
use serde::{Deserialize, Serialize};

use crate::config::{PreSnapshotPolicy, SyncConfig};
use crate::dirty_tracker::DirtyTracker;
use crate::events::{
    TodoCompleted, TodoCompletedPayload, TodoCreated, TodoCreatedPayload, TodoDeleted,
    TodoDeletedPayload, TodoUpdated, TodoUpdatedPayload,
};
use crate::ledger::{RawTodo, SnapshotReadError, SnapshotReader};
use crate::status::{TodoStatus, decode_status};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct Todo {
    pub title: String,
    pub description: String,
    pub status: TodoStatus,
}

impl From<RawTodo> for Todo {
    fn from(raw: RawTodo) -> Self {
        Todo {
            title: raw.title,
            description: raw.description,
            status: decode_status(raw.status),
        }
    }
}

/// Assigned when a todo is first stored locally; never reused within a reconciler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct TodoId(u64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub struct TodoEntry {
    pub id: TodoId,
    pub todo: Todo,
}

/// A mutation notification as the reconciler stores it while buffering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Patch {
    Created(TodoCreatedPayload),
    Updated(TodoUpdatedPayload),
    Completed(TodoCompletedPayload),
    Deleted(TodoDeletedPayload),
}

impl Patch {
    fn event(&self) -> &'static str {
        match self {
            Patch::Created(_) => TodoCreated::NAME,
            Patch::Updated(_) => TodoUpdated::NAME,
            Patch::Completed(_) => TodoCompleted::NAME,
            Patch::Deleted(_) => TodoDeleted::NAME,
        }
    }

    fn target(&self) -> Option<usize> {
        match self {
            Patch::Created(_) => None,
            Patch::Updated(p) => Some(p.index),
            Patch::Completed(p) => Some(p.index),
            Patch::Deleted(p) => Some(p.index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("{event} targets index {index}, but there are only {len} todos")]
    OutOfRange {
        event: &'static str,
        index: usize,
        len: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Live,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InitOutcome {
    /// The snapshot replaced the collection; carries the number of todos read.
    Loaded(usize),
    /// The read failed and the previous collection was kept.
    Failed,
    /// Torn down or re-initialized while the read was in flight; the result was discarded.
    Stale,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStatus {
    /// If last_started > last_finished, a read is in progress.
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,

    /// If last_error is Some, the last read failed. Gets reset to None when the next read succeeds.
    pub last_error: Option<String>,
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ChangeListenerKey(pub(crate) slotmap::DefaultKey);

#[derive(Clone, Debug, Default)]
struct Collection {
    entries: im::Vector<TodoEntry>,
    next_id: u64,
}

impl Collection {
    fn entry(&mut self, todo: Todo) -> TodoEntry {
        let id = TodoId(self.next_id);
        self.next_id += 1;
        TodoEntry { id, todo }
    }

    fn check(&self, patch: &Patch) -> Result<(), PatchError> {
        match patch.target() {
            Some(index) if index >= self.entries.len() => Err(PatchError::OutOfRange {
                event: patch.event(),
                index,
                len: self.entries.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Expects a patch that passed [`Collection::check`].
    fn apply(&mut self, patch: Patch) {
        match patch {
            Patch::Created(p) => {
                let entry = self.entry(Todo {
                    title: p.title,
                    description: p.description,
                    status: decode_status(p.status),
                });
                self.entries.push_back(entry);
            }
            Patch::Updated(p) => {
                if let Some(entry) = self.entries.get_mut(p.index) {
                    entry.todo = Todo {
                        title: p.title,
                        description: p.description,
                        status: decode_status(p.status),
                    };
                }
            }
            Patch::Completed(p) => {
                if let Some(entry) = self.entries.get_mut(p.index) {
                    entry.todo.status = decode_status(p.status);
                }
            }
            Patch::Deleted(p) => {
                self.entries.remove(p.index);
            }
        }
    }

    fn replace_all(&mut self, snapshot: Vec<RawTodo>) {
        let mut entries = im::Vector::new();
        for raw in snapshot {
            entries.push_back(self.entry(raw.into()));
        }
        self.entries = entries;
    }
}

struct ReconcilerState {
    collection: DirtyTracker<Collection>,
    phase: Phase,
    pending: VecDeque<Patch>,
    /// Bumped by every initialize and teardown; a snapshot only applies if it is still current.
    generation: u64,
    snapshot: SnapshotStatus,
    pre_snapshot: PreSnapshotPolicy,
    max_pending_events: usize,
}

impl ReconcilerState {
    fn receive(&mut self, patch: Patch) {
        if self.phase == Phase::Uninitialized && self.pre_snapshot == PreSnapshotPolicy::Buffer {
            self.buffer(patch);
        } else {
            self.apply(patch);
        }
    }

    fn buffer(&mut self, patch: Patch) {
        if self.max_pending_events == 0 {
            log::warn!("Dropping {} received before the snapshot", patch.event());
            return;
        }
        while self.pending.len() >= self.max_pending_events {
            if let Some(dropped) = self.pending.pop_front() {
                log::warn!(
                    "Pending notification buffer is full, dropping the oldest ({})",
                    dropped.event()
                );
            }
        }
        self.pending.push_back(patch);
    }

    fn apply(&mut self, patch: Patch) {
        if let Err(e) = self.collection.store().check(&patch) {
            log::warn!("Ignoring notification: {e}");
            return;
        }
        self.collection.store_mut().apply(patch);
    }

    fn finish_snapshot(&mut self, result: Result<Vec<RawTodo>, SnapshotReadError>) -> InitOutcome {
        let outcome = match result {
            Ok(snapshot) => {
                let len = snapshot.len();
                self.collection.store_mut().replace_all(snapshot);
                self.snapshot.last_error = None;
                log::info!("Fetched {len} todos from the snapshot");
                InitOutcome::Loaded(len)
            }
            Err(e) => {
                log::error!("Error fetching todos: {e}");
                self.snapshot.last_error = Some(e.to_string());
                InitOutcome::Failed
            }
        };
        self.snapshot.last_finished = Some(Utc::now());

        self.phase = Phase::Live;
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            log::debug!(
                "Replaying {} notifications received before the snapshot",
                pending.len()
            );
        }
        for patch in pending {
            self.apply(patch);
        }
        self.collection.mark_loaded();

        outcome
    }
}

type ChangeListener = Rc<dyn Fn()>;

struct Shared {
    state: RefCell<ReconcilerState>,
    listeners: RefCell<slotmap::SlotMap<slotmap::DefaultKey, ChangeListener>>,
}

impl Shared {
    fn receive(&self, patch: Patch) {
        self.state.borrow_mut().receive(patch);
        self.flush_notifications();
    }

    /// Listeners run after the state borrow is released, so they are free to read the reconciler. A listener
    /// that panics is logged and skipped; the rest still hear about the change.
    fn flush_notifications(&self) {
        if !self.state.borrow_mut().collection.take_dirty() {
            return;
        }
        let listeners: Vec<(slotmap::DefaultKey, ChangeListener)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(key, listener)| (key, listener.clone()))
            .collect();
        for (key, listener) in listeners {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| listener())) {
                let message = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<non-string panic payload>");
                log::error!("Change listener {key:?} panicked: {message}");
            }
        }
    }
}

pub struct TodoReconciler {
    bus: Rc<EventBus>,
    shared: Rc<Shared>,
    handles: RefCell<Vec<SubscriptionHandle>>,
}

impl TodoReconciler {
    pub fn new(bus: Rc<EventBus>, config: &SyncConfig) -> Self {
        let state = ReconcilerState {
            collection: DirtyTracker::default(),
            phase: Phase::Uninitialized,
            pending: VecDeque::new(),
            generation: 0,
            snapshot: SnapshotStatus::default(),
            pre_snapshot: config.pre_snapshot,
            max_pending_events: config.max_pending_events,
        };
        Self {
            bus,
            shared: Rc::new(Shared {
                state: RefCell::new(state),
                listeners: RefCell::new(slotmap::SlotMap::new()),
            }),
            handles: RefCell::new(Vec::new()),
        }
    }

    /// Subscribes to the four mutation events. Returns false (and does nothing) if already active.
    pub fn activate(&self) -> bool {
        let mut handles = self.handles.borrow_mut();
        if !handles.is_empty() {
            return false;
        }

        let shared = Rc::downgrade(&self.shared);
        handles.extend([
            subscribe_patch::<TodoCreated>(&self.bus, &shared, Patch::Created),
            subscribe_patch::<TodoUpdated>(&self.bus, &shared, Patch::Updated),
            subscribe_patch::<TodoCompleted>(&self.bus, &shared, Patch::Completed),
            subscribe_patch::<TodoDeleted>(&self.bus, &shared, Patch::Deleted),
        ]);
        log::debug!("Reconciler activated");
        true
    }

    pub fn is_active(&self) -> bool {
        !self.handles.borrow().is_empty()
    }

    /// Reads the snapshot and replaces the collection with it. Never fails: a failed read is logged, the
    /// previous collection is kept, and the reconciler goes live regardless.
    pub async fn initialize<R: SnapshotReader>(&self, reader: &R) -> InitOutcome {
        let generation = {
            let mut state = self.shared.state.borrow_mut();
            state.generation += 1;
            state.phase = Phase::Uninitialized;
            state.snapshot.last_started = Some(Utc::now());
            state.generation
        };

        // no borrow may be held across this await
        let result = reader.read_all().await;

        let outcome = {
            let mut state = self.shared.state.borrow_mut();
            if state.generation != generation {
                log::debug!("Discarding a snapshot that was superseded while in flight");
                return InitOutcome::Stale;
            }
            state.finish_snapshot(result)
        };
        self.shared.flush_notifications();
        outcome
    }

    /// Unsubscribes from the bus and invalidates any snapshot read in flight. Safe to call repeatedly.
    pub fn teardown(&self) {
        let handles = std::mem::take(&mut *self.handles.borrow_mut());
        for handle in handles {
            self.bus.unsubscribe(handle);
        }

        let mut state = self.shared.state.borrow_mut();
        state.generation += 1;
        state.phase = Phase::Uninitialized;
        if !state.pending.is_empty() {
            log::debug!(
                "Discarding {} notifications buffered before teardown",
                state.pending.len()
            );
            state.pending.clear();
        }
    }

    /// A by-value copy of the collection, in ledger order.
    pub fn get_collection(&self) -> Vec<Todo> {
        self.shared
            .state
            .borrow()
            .collection
            .store()
            .entries
            .iter()
            .map(|entry| entry.todo.clone())
            .collect()
    }

    /// Cheap to call: the collection is a persistent vector, so this only shares structure.
    pub fn entries(&self) -> im::Vector<TodoEntry> {
        self.shared.state.borrow().collection.store().entries.clone()
    }

    pub fn get(&self, index: usize) -> Option<TodoEntry> {
        self.shared
            .state
            .borrow()
            .collection
            .store()
            .entries
            .get(index)
            .cloned()
    }

    pub fn position_of(&self, id: TodoId) -> Option<usize> {
        self.shared
            .state
            .borrow()
            .collection
            .store()
            .entries
            .iter()
            .position(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.shared.state.borrow().collection.store().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    pub fn is_live(&self) -> bool {
        self.phase() == Phase::Live
    }

    /// True once any snapshot attempt has completed, successful or not.
    pub fn loaded_at_least_once(&self) -> bool {
        self.shared.state.borrow().collection.loaded_at_least_once()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.borrow().pending.len()
    }

    pub fn snapshot_status(&self) -> SnapshotStatus {
        self.shared.state.borrow().snapshot.clone()
    }

    /// The listener is invoked after every flush in which the collection changed.
    pub fn subscribe_changes(&self, listener: impl Fn() + 'static) -> ChangeListenerKey {
        ChangeListenerKey(self.shared.listeners.borrow_mut().insert(Rc::new(listener)))
    }

    pub fn unsubscribe_changes(&self, key: ChangeListenerKey) -> bool {
        self.shared.listeners.borrow_mut().remove(key.0).is_some()
    }
}

impl Drop for TodoReconciler {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn subscribe_patch<K: EventKey>(
    bus: &EventBus,
    shared: &Weak<Shared>,
    into_patch: fn(K::Payload) -> Patch,
) -> SubscriptionHandle
where
    K::Payload: Clone,
{
    let shared = shared.clone();
    bus.subscribe::<K>(move |payload| {
        if let Some(shared) = shared.upgrade() {
            shared.receive(into_patch(payload.clone()));
        }
    })
}
