//! # EventKey
//! An `EventKey` names a kind of event and fixes the type of its payload. The bus itself is addressed by the
//! `NAME` string, but subscribers and dispatchers only ever go through the key type, so a callback that
//! expects the wrong payload is a compile error rather than a runtime surprise.
//!
//! Adding a new kind of event never touches the bus: declare a new key and start dispatching it.

pub trait EventKey: 'static {
    const NAME: &'static str;
    type Payload: 'static;
}

/// Declares a unit struct implementing [`EventKey`].
///
/// ```
/// holler::event_key!(
///     /// Fired when the user renames something.
///     pub Renamed: String = "renamed"
/// );
/// assert_eq!(<Renamed as holler::EventKey>::NAME, "renamed");
/// ```
#[macro_export]
macro_rules! event_key {
    ($(#[$meta:meta])* $vis:vis $key:ident : $payload:ty = $name:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        $vis struct $key;

        impl $crate::EventKey for $key {
            const NAME: &'static str = $name;
            type Payload = $payload;
        }
    };
}
