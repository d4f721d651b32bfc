//! In-memory stand-ins for the ledger, shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;

use crate::events::LedgerEvent;
use crate::ledger::{EventSource, RawHandler, RawTodo, SnapshotReadError, SnapshotReader};

pub(crate) fn raw(title: &str, description: &str, status: i64) -> RawTodo {
    RawTodo {
        title: title.to_string(),
        description: description.to_string(),
        status,
    }
}

/// Acts as both event source and snapshot reader, like a contract handle does.
pub(crate) struct FakeLedger {
    handlers: RefCell<HashMap<LedgerEvent, Vec<RawHandler>>>,
    remove_all_calls: Cell<usize>,
    snapshot: Result<Vec<RawTodo>, String>,
}

impl Default for FakeLedger {
    fn default() -> Self {
        Self::with_snapshot(Vec::new())
    }
}

impl FakeLedger {
    pub(crate) fn with_snapshot(snapshot: Vec<RawTodo>) -> Self {
        Self {
            handlers: RefCell::new(HashMap::new()),
            remove_all_calls: Cell::new(0),
            snapshot: Ok(snapshot),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            snapshot: Err(message.to_string()),
            ..Self::default()
        }
    }

    /// Delivers a notification to every handler registered for `event`.
    pub(crate) fn emit(&self, event: LedgerEvent, args: Vec<serde_json::Value>) {
        let handlers = self
            .handlers
            .borrow()
            .get(&event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(args.as_slice());
        }
    }

    pub(crate) fn listener_count(&self, event: LedgerEvent) -> usize {
        self.handlers.borrow().get(&event).map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn remove_all_calls(&self) -> usize {
        self.remove_all_calls.get()
    }
}

impl EventSource for FakeLedger {
    fn on(&self, event: LedgerEvent, handler: RawHandler) {
        self.handlers
            .borrow_mut()
            .entry(event)
            .or_default()
            .push(handler);
    }

    fn remove_all_listeners(&self) {
        self.remove_all_calls.set(self.remove_all_calls.get() + 1);
        self.handlers.borrow_mut().clear();
    }
}

impl SnapshotReader for FakeLedger {
    async fn read_all(&self) -> Result<Vec<RawTodo>, SnapshotReadError> {
        self.snapshot
            .clone()
            .map_err(SnapshotReadError::Transport)
    }
}

/// A snapshot reader that stays pending until the returned sender fires.
pub(crate) struct GatedSnapshot {
    receiver: RefCell<Option<oneshot::Receiver<Result<Vec<RawTodo>, SnapshotReadError>>>>,
}

pub(crate) fn gated_snapshot() -> (
    oneshot::Sender<Result<Vec<RawTodo>, SnapshotReadError>>,
    GatedSnapshot,
) {
    let (sender, receiver) = oneshot::channel();
    (
        sender,
        GatedSnapshot {
            receiver: RefCell::new(Some(receiver)),
        },
    )
}

impl SnapshotReader for GatedSnapshot {
    async fn read_all(&self) -> Result<Vec<RawTodo>, SnapshotReadError> {
        let receiver = self
            .receiver
            .borrow_mut()
            .take()
            .ok_or_else(|| SnapshotReadError::Transport("gate already used".to_string()))?;
        receiver
            .await
            .unwrap_or_else(|_| Err(SnapshotReadError::Transport("gate dropped".to_string())))
    }
}

/// Polls a future exactly once, for driving reads step by step.
pub(crate) fn poll_once<F: Future>(future: Pin<&mut F>) -> Poll<F::Output> {
    let waker = futures::task::noop_waker();
    let mut cx = Context::from_waker(&waker);
    future.poll(&mut cx)
}
