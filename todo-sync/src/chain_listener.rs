//! # ChainListener
//! Bridges the ledger's notification source onto the bus. It decodes positional arguments into the typed
//! payloads of [`crate::events`] and dispatches them; it never touches the todo collection.
//!
//! Status codes are forwarded raw. Turning them into labels is the reconciler's job, for all four events.

use std::cell::Cell;
use std::rc::Rc;

use holler::{EventBus, EventKey};
use serde_json::Value;

use crate::events::{
    LedgerEvent, TodoCompleted, TodoCompletedPayload, TodoCreated, TodoCreatedPayload,
    TodoDeleted, TodoDeletedPayload, TodoUpdated, TodoUpdatedPayload,
};
use crate::ledger::{EventSource, RawHandler, integer_from_json, saturating_i64};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{event} expects {expected} arguments, got {actual}")]
    Arity {
        event: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{event}: `{field}` is not a string")]
    NotAString {
        event: &'static str,
        field: &'static str,
    },
    #[error("{event}: `{field}` is not an integer")]
    NotAnInteger {
        event: &'static str,
        field: &'static str,
    },
    #[error("{event}: index {index} is not a valid position")]
    InvalidIndex { event: &'static str, index: i128 },
}

/// Positional arguments of one notification, checked for arity up front.
struct Args<'a> {
    event: LedgerEvent,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn new(event: LedgerEvent, values: &'a [Value]) -> Result<Self, DecodeError> {
        if values.len() != event.arity() {
            return Err(DecodeError::Arity {
                event: event.name(),
                expected: event.arity(),
                actual: values.len(),
            });
        }
        Ok(Self { event, values })
    }

    fn string(&self, position: usize, field: &'static str) -> Result<String, DecodeError> {
        self.values[position]
            .as_str()
            .map(str::to_string)
            .ok_or(DecodeError::NotAString {
                event: self.event.name(),
                field,
            })
    }

    fn integer(&self, position: usize, field: &'static str) -> Result<i128, DecodeError> {
        integer_from_json(&self.values[position]).ok_or(DecodeError::NotAnInteger {
            event: self.event.name(),
            field,
        })
    }

    fn status(&self, position: usize) -> Result<i64, DecodeError> {
        self.integer(position, "status").map(saturating_i64)
    }

    fn index(&self, position: usize) -> Result<usize, DecodeError> {
        let index = self.integer(position, "index")?;
        usize::try_from(index).map_err(|_| DecodeError::InvalidIndex {
            event: self.event.name(),
            index,
        })
    }
}

pub fn decode_created(values: &[Value]) -> Result<TodoCreatedPayload, DecodeError> {
    let args = Args::new(LedgerEvent::TodoCreated, values)?;
    Ok(TodoCreatedPayload {
        title: args.string(0, "title")?,
        description: args.string(1, "description")?,
        status: args.status(2)?,
    })
}

pub fn decode_updated(values: &[Value]) -> Result<TodoUpdatedPayload, DecodeError> {
    let args = Args::new(LedgerEvent::TodoUpdated, values)?;
    Ok(TodoUpdatedPayload {
        index: args.index(0)?,
        title: args.string(1, "title")?,
        description: args.string(2, "description")?,
        status: args.status(3)?,
    })
}

pub fn decode_completed(values: &[Value]) -> Result<TodoCompletedPayload, DecodeError> {
    let args = Args::new(LedgerEvent::TodoCompleted, values)?;
    Ok(TodoCompletedPayload {
        index: args.index(0)?,
        status: args.status(1)?,
    })
}

pub fn decode_deleted(values: &[Value]) -> Result<TodoDeletedPayload, DecodeError> {
    let args = Args::new(LedgerEvent::TodoDeleted, values)?;
    Ok(TodoDeletedPayload {
        index: args.index(0)?,
    })
}

pub struct ChainListener<S: EventSource> {
    bus: Rc<EventBus>,
    source: Rc<S>,
    attached: Cell<bool>,
}

impl<S: EventSource> ChainListener<S> {
    pub fn new(bus: Rc<EventBus>, source: Rc<S>) -> Self {
        Self {
            bus,
            source,
            attached: Cell::new(false),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    pub fn source(&self) -> &Rc<S> {
        &self.source
    }

    /// Registers one handler per ledger event. Returns false (and does nothing) if already attached.
    pub fn attach(&self) -> bool {
        if self.attached.get() {
            log::debug!("Chain listener already attached");
            return false;
        }

        for event in LedgerEvent::ALL {
            let handler = match event {
                LedgerEvent::TodoCreated => forward::<TodoCreated>(&self.bus, event, decode_created),
                LedgerEvent::TodoUpdated => forward::<TodoUpdated>(&self.bus, event, decode_updated),
                LedgerEvent::TodoCompleted => {
                    forward::<TodoCompleted>(&self.bus, event, decode_completed)
                }
                LedgerEvent::TodoDeleted => forward::<TodoDeleted>(&self.bus, event, decode_deleted),
            };
            self.source.on(event, handler);
        }
        self.attached.set(true);
        log::debug!("Chain listener attached");
        true
    }

    /// Removes every handler from the source. Returns false (and does nothing) if not attached.
    pub fn detach(&self) -> bool {
        if !self.attached.replace(false) {
            return false;
        }
        self.source.remove_all_listeners();
        log::debug!("Chain listener detached");
        true
    }

    /// Re-establishes the source subscription, e.g. after the connection dropped. Bus subscribers don't notice.
    pub fn reconnect(&self) {
        self.detach();
        self.attach();
    }
}

impl<S: EventSource> Drop for ChainListener<S> {
    fn drop(&mut self) {
        self.detach();
    }
}

fn forward<K: EventKey>(
    bus: &Rc<EventBus>,
    event: LedgerEvent,
    decode: fn(&[Value]) -> Result<K::Payload, DecodeError>,
) -> RawHandler {
    let bus = Rc::downgrade(bus);
    Rc::new(move |values: &[Value]| {
        let Some(bus) = bus.upgrade() else {
            return;
        };
        match decode(values) {
            Ok(payload) => {
                bus.dispatch::<K>(&payload);
            }
            Err(e) => {
                log::warn!("Dropping malformed {} notification: {e}", event.name());
            }
        }
    })
}
