//! # EventBus
//! The registry itself. Every method takes `&self`: the bus is meant to be shared behind an `Rc` by all the
//! components of a session, and subscribers are allowed to call back into it while a dispatch is running.
//!
//! To make that safe, `dispatch` copies out the subscriber list and releases its borrow before calling anyone.
//! The consequence is that (un)subscribing from inside a callback only takes effect from the next dispatch.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use crate::registry::{ErasedCallback, EventKey, Subscriber, SubscriptionHandle, erase};

#[derive(Default)]
pub struct EventBus {
    registry: RefCell<Registry>,
}

#[derive(Default)]
struct Registry {
    /// Which event name each live handle was registered under.
    handles: slotmap::SlotMap<slotmap::DefaultKey, &'static str>,
    /// Subscribers per event name, in registration order.
    subscribers: HashMap<&'static str, Vec<Subscriber>>,
}

/// What happened during a single dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Subscribers that panicked, returned an error, or were registered under the same name with a different
    /// payload type.
    pub failed: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// The callback is invoked for every future dispatch of `K`, until the handle is unsubscribed.
    pub fn subscribe<K: EventKey>(
        &self,
        callback: impl Fn(&K::Payload) + 'static,
    ) -> SubscriptionHandle {
        self.subscribe_fallible::<K, Infallible>(move |payload| {
            callback(payload);
            Ok(())
        })
    }

    /// Like [`subscribe`](Self::subscribe), for callbacks that can fail. An `Err` is logged and counted in
    /// [`DispatchReport::failed`]; unlike a panic, it is contained on every target.
    pub fn subscribe_fallible<K: EventKey, E: Display + 'static>(
        &self,
        callback: impl Fn(&K::Payload) -> Result<(), E> + 'static,
    ) -> SubscriptionHandle {
        let mut registry = self.registry.borrow_mut();
        let handle = SubscriptionHandle(registry.handles.insert(K::NAME));
        registry
            .subscribers
            .entry(K::NAME)
            .or_default()
            .push(Subscriber {
                handle,
                callback: erase::<K, E>(callback),
            });
        log::trace!("Subscribed {handle:?} to `{}`", K::NAME);
        handle
    }

    /// Returns false if the handle had already been removed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(name) = registry.handles.remove(handle.0) else {
            return false;
        };

        if let Some(subscribers) = registry.subscribers.get_mut(name) {
            subscribers.retain(|subscriber| subscriber.handle != handle);
            if subscribers.is_empty() {
                registry.subscribers.remove(name);
            }
        }
        log::trace!("Unsubscribed {handle:?} from `{name}`");
        true
    }

    pub fn is_subscribed(&self, handle: SubscriptionHandle) -> bool {
        self.registry.borrow().handles.contains_key(handle.0)
    }

    pub fn subscriber_count<K: EventKey>(&self) -> usize {
        self.registry
            .borrow()
            .subscribers
            .get(K::NAME)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Synchronously hands `payload` to everyone subscribed to `K` when the dispatch starts, in registration
    /// order. Never panics because of a subscriber, as long as panics unwind.
    pub fn dispatch<K: EventKey>(&self, payload: &K::Payload) -> DispatchReport {
        // do it like this to avoid holding the borrow while we call the callbacks
        let callbacks: Vec<ErasedCallback> = {
            let registry = self.registry.borrow();
            match registry.subscribers.get(K::NAME) {
                Some(subscribers) => subscribers.iter().map(|s| s.callback.clone()).collect(),
                None => {
                    log::trace!("No subscribers for `{}`", K::NAME);
                    return DispatchReport::default();
                }
            }
        };

        let payload: &dyn Any = payload;
        let mut report = DispatchReport::default();
        for callback in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.failed += 1,
                Err(panic) => {
                    log::error!(
                        "Subscriber to `{}` panicked: {}",
                        K::NAME,
                        panic_message(panic.as_ref())
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    crate::event_key!(Ping: u32 = "ping");
    crate::event_key!(Pong: String = "pong");
    crate::event_key!(FakePing: String = "ping");

    #[test]
    fn test_dispatch_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.dispatch::<Ping>(&1), DispatchReport::default());
    }

    #[test]
    fn test_registration_order() {
        let bus = EventBus::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let calls = calls.clone();
            bus.subscribe::<Ping>(move |n| calls.borrow_mut().push(format!("{name}:{n}")));
        }

        let report = bus.dispatch::<Ping>(&7);
        assert_eq!(report.delivered, 3);
        assert_eq!(*calls.borrow(), vec!["first:7", "second:7", "third:7"]);
    }

    #[test]
    fn test_keys_are_independent() {
        let bus = EventBus::new();
        let pings = Rc::new(Cell::new(0));
        let pongs = Rc::new(RefCell::new(String::new()));

        {
            let pings = pings.clone();
            bus.subscribe::<Ping>(move |n| pings.set(pings.get() + n));
        }
        {
            let pongs = pongs.clone();
            bus.subscribe::<Pong>(move |s| pongs.borrow_mut().push_str(s));
        }

        bus.dispatch::<Ping>(&2);
        bus.dispatch::<Pong>(&"hello".to_string());
        bus.dispatch::<Ping>(&3);

        assert_eq!(pings.get(), 5);
        assert_eq!(*pongs.borrow(), "hello");
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
        assert_eq!(bus.subscriber_count::<Pong>(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));
        let handle = {
            let calls = calls.clone();
            bus.subscribe::<Ping>(move |_| calls.set(calls.get() + 1))
        };

        assert!(bus.is_subscribed(handle));
        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        assert!(!bus.is_subscribed(handle));

        bus.dispatch::<Ping>(&1);
        assert_eq!(calls.get(), 0);
        assert_eq!(bus.subscriber_count::<Ping>(), 0);
    }

    #[test]
    fn test_stale_handle_does_not_remove_newer_subscription() {
        let bus = EventBus::new();
        let old = bus.subscribe::<Ping>(|_| {});
        bus.unsubscribe(old);

        let calls = Rc::new(Cell::new(0));
        let new = {
            let calls = calls.clone();
            bus.subscribe::<Ping>(move |_| calls.set(calls.get() + 1))
        };

        assert!(!bus.unsubscribe(old));
        assert!(bus.is_subscribed(new));
        bus.dispatch::<Ping>(&1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let bus = EventBus::new();
        let reached = Rc::new(Cell::new(false));

        bus.subscribe::<Ping>(|_| panic!("subscriber blew up"));
        {
            let reached = reached.clone();
            bus.subscribe::<Ping>(move |_| reached.set(true));
        }

        let report = bus.dispatch::<Ping>(&1);
        assert!(reached.get());
        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                failed: 1
            }
        );

        // the bus is still usable afterwards
        reached.set(false);
        bus.dispatch::<Ping>(&2);
        assert!(reached.get());
    }

    #[test]
    fn test_fallible_subscriber_errors_are_counted() {
        let bus = EventBus::new();
        let reached = Rc::new(Cell::new(0));

        bus.subscribe_fallible::<Ping, String>(|n| {
            if n % 2 == 1 {
                Err(format!("{n} is odd"))
            } else {
                Ok(())
            }
        });
        {
            let reached = reached.clone();
            bus.subscribe::<Ping>(move |_| reached.set(reached.get() + 1));
        }

        assert_eq!(
            bus.dispatch::<Ping>(&3),
            DispatchReport {
                delivered: 1,
                failed: 1
            }
        );
        assert_eq!(
            bus.dispatch::<Ping>(&4),
            DispatchReport {
                delivered: 2,
                failed: 0
            }
        );
        assert_eq!(reached.get(), 2);
    }

    #[test]
    fn test_subscribing_during_dispatch_applies_to_next_dispatch() {
        let bus = Rc::new(EventBus::new());
        let late_calls = Rc::new(Cell::new(0));

        {
            let weak_bus = Rc::downgrade(&bus);
            let late_calls = late_calls.clone();
            bus.subscribe::<Ping>(move |_| {
                let Some(bus) = weak_bus.upgrade() else {
                    return;
                };
                let late_calls = late_calls.clone();
                bus.subscribe::<Pong>(move |_| late_calls.set(late_calls.get() + 1));
            });
        }

        bus.dispatch::<Ping>(&1);
        assert_eq!(bus.subscriber_count::<Pong>(), 1);
        bus.dispatch::<Pong>(&String::new());
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn test_unsubscribing_self_during_dispatch() {
        let bus = Rc::new(EventBus::new());
        let calls = Rc::new(Cell::new(0));
        let handle = Rc::new(Cell::new(None));

        {
            let weak_bus = Rc::downgrade(&bus);
            let calls = calls.clone();
            let handle_slot = handle.clone();
            handle.set(Some(bus.subscribe::<Ping>(move |_| {
                calls.set(calls.get() + 1);
                if let (Some(bus), Some(handle)) = (weak_bus.upgrade(), handle_slot.get()) {
                    bus.unsubscribe(handle);
                }
            })));
        }

        bus.dispatch::<Ping>(&1);
        bus.dispatch::<Ping>(&2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_nested_dispatch() {
        let bus = Rc::new(EventBus::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let weak_bus = Rc::downgrade(&bus);
            let log = log.clone();
            bus.subscribe::<Ping>(move |n| {
                log.borrow_mut().push(format!("ping {n}"));
                if let Some(bus) = weak_bus.upgrade() {
                    bus.dispatch::<Pong>(&format!("reply to {n}"));
                }
            });
        }
        {
            let log = log.clone();
            bus.subscribe::<Pong>(move |s| log.borrow_mut().push(s.clone()));
        }

        bus.dispatch::<Ping>(&4);
        assert_eq!(*log.borrow(), vec!["ping 4", "reply to 4"]);
    }

    #[test]
    fn test_mismatched_payload_type_is_skipped() {
        let bus = EventBus::new();
        let pings = Rc::new(Cell::new(0));

        bus.subscribe::<FakePing>(|_| unreachable!("payload is never a String"));
        {
            let pings = pings.clone();
            bus.subscribe::<Ping>(move |n| pings.set(*n));
        }

        let report = bus.dispatch::<Ping>(&9);
        assert_eq!(pings.get(), 9);
        assert_eq!(
            report,
            DispatchReport {
                delivered: 1,
                failed: 1
            }
        );
    }
}
