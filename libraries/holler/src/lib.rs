//! A small publish/subscribe bus for single-threaded apps.
//! It was written to carry ledger notifications into UI state, but it knows nothing about either.
//!
//! Model:
//! 1. Every kind of event is a type implementing [`EventKey`]. The key has a string name (what the bus is
//!    addressed by) and a payload type (what subscribers receive).
//! 2. Components [`subscribe`](EventBus::subscribe) to a key and get back a [`SubscriptionHandle`], which they
//!    use to [`unsubscribe`](EventBus::unsubscribe) when they go away.
//! 3. [`dispatch`](EventBus::dispatch) calls every subscriber of the key, in the order they subscribed, before
//!    it returns. Nothing is queued, and an event nobody listens to is dropped.
//!
//! A subscriber that panics is isolated: it gets logged, and the remaining subscribers still run. That relies on
//! unwinding, so it does not hold where panics abort (`wasm32-unknown-unknown` by default). Subscribers that can
//! fail there should use [`subscribe_fallible`](EventBus::subscribe_fallible) and return an error instead.

pub mod registry;

pub use registry::{DispatchReport, EventBus, EventKey, SubscriptionHandle};
