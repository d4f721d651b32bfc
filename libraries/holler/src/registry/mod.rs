#[path = "1-event-key.rs"]
mod event_key;

#[path = "2-subscription.rs"]
mod subscription;

#[path = "3-bus.rs"]
mod bus;

pub use bus::*;
pub use event_key::*;
pub use subscription::*;
