//! # Subscription
//! Subscribers are stored type-erased, since one registry holds callbacks for many payload types.
//! The erasure happens in [`erase`], which is the only place that knows the key's payload type; it downcasts
//! the payload back before calling the user's callback.
//!
//! Handles are slotmap keys, so they are generational: once a handle has been removed, it can never refer to
//! a later subscription that happens to reuse the slot.

use std::any::Any;
use std::fmt::Display;
use std::rc::Rc;

use crate::registry::EventKey;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionHandle(pub(crate) slotmap::DefaultKey);

/// Returns false if the subscriber reported an error, or if the payload was not of the type it was registered
/// for.
pub(crate) type ErasedCallback = Rc<dyn Fn(&dyn Any) -> bool>;

pub(crate) struct Subscriber {
    pub(crate) handle: SubscriptionHandle,
    pub(crate) callback: ErasedCallback,
}

pub(crate) fn erase<K: EventKey, E: Display + 'static>(
    callback: impl Fn(&K::Payload) -> Result<(), E> + 'static,
) -> ErasedCallback {
    Rc::new(move |payload: &dyn Any| match payload.downcast_ref::<K::Payload>() {
        Some(payload) => match callback(payload) {
            Ok(()) => true,
            Err(e) => {
                log::error!("Subscriber to `{}` failed: {e}", K::NAME);
                false
            }
        },
        None => {
            log::error!(
                "Payload type mismatch on `{}`: subscriber expects {}",
                K::NAME,
                std::any::type_name::<K::Payload>()
            );
            false
        }
    })
}
