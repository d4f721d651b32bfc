//! Bus keys for the ledger's four mutation notifications.
//! Payloads mirror what the ledger emits: positions are ledger indices and `status` is the raw integer code.

use holler::{EventKey, event_key};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoCreatedPayload {
    pub title: String,
    pub description: String,
    pub status: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoUpdatedPayload {
    pub index: usize,
    pub title: String,
    pub description: String,
    pub status: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoCompletedPayload {
    pub index: usize,
    pub status: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoDeletedPayload {
    pub index: usize,
}

event_key!(pub TodoCreated: TodoCreatedPayload = "TodoCreated");
event_key!(pub TodoUpdated: TodoUpdatedPayload = "TodoUpdated");
event_key!(pub TodoCompleted: TodoCompletedPayload = "TodoCompleted");
event_key!(pub TodoDeleted: TodoDeletedPayload = "TodoDeleted");

/// The notification kinds an [`EventSource`](crate::ledger::EventSource) can be asked to listen for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerEvent {
    TodoCreated,
    TodoUpdated,
    TodoCompleted,
    TodoDeleted,
}

impl LedgerEvent {
    pub const ALL: [LedgerEvent; 4] = [
        LedgerEvent::TodoCreated,
        LedgerEvent::TodoUpdated,
        LedgerEvent::TodoCompleted,
        LedgerEvent::TodoDeleted,
    ];

    /// The ledger's event name, which is also the bus key's name.
    pub fn name(self) -> &'static str {
        match self {
            LedgerEvent::TodoCreated => TodoCreated::NAME,
            LedgerEvent::TodoUpdated => TodoUpdated::NAME,
            LedgerEvent::TodoCompleted => TodoCompleted::NAME,
            LedgerEvent::TodoDeleted => TodoDeleted::NAME,
        }
    }

    /// Number of positional arguments the ledger passes for this event.
    pub fn arity(self) -> usize {
        match self {
            LedgerEvent::TodoCreated => 3,
            LedgerEvent::TodoUpdated => 4,
            LedgerEvent::TodoCompleted => 2,
            LedgerEvent::TodoDeleted => 1,
        }
    }
}
