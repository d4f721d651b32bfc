//! # Theme
//! UI-only state that rides the same bus as the ledger notifications. Any component can toggle the theme;
//! every [`ThemeState`] on the bus follows along.

use std::cell::Cell;
use std::rc::Rc;

use holler::{EventBus, SubscriptionHandle, event_key};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

event_key!(pub ThemeChanged: Theme = "onThemeChange");

pub struct ThemeState {
    bus: Rc<EventBus>,
    current: Rc<Cell<Theme>>,
    handle: Cell<Option<SubscriptionHandle>>,
}

impl ThemeState {
    pub fn new(bus: Rc<EventBus>, initial: Theme) -> Self {
        let current = Rc::new(Cell::new(initial));
        let handle = {
            let current = current.clone();
            bus.subscribe::<ThemeChanged>(move |theme| current.set(*theme))
        };
        Self {
            bus,
            current,
            handle: Cell::new(Some(handle)),
        }
    }

    pub fn theme(&self) -> Theme {
        self.current.get()
    }

    /// Broadcasts the opposite theme and returns it.
    pub fn toggle(&self) -> Theme {
        let next = self.current.get().toggled();
        self.bus.dispatch::<ThemeChanged>(&next);
        next
    }

    pub fn teardown(&self) {
        if let Some(handle) = self.handle.take() {
            self.bus.unsubscribe(handle);
        }
    }
}

impl Drop for ThemeState {
    fn drop(&mut self) {
        self.teardown();
    }
}
