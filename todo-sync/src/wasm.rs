//! JavaScript bindings. The host passes in an ethers-style contract object, which serves as both the event
//! source (`on` / `removeAllListeners`) and the snapshot reader (`getAllTodo`).

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Promise, Reflect};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::events::LedgerEvent;
use crate::ledger::{EventSource, RawHandler, RawTodo, SnapshotReadError, SnapshotReader};
use crate::reconciler::{ChangeListenerKey, InitOutcome};
use crate::theme::{Theme, ThemeState};
use crate::{EventBus, SyncConfig, TodoSync};

#[wasm_bindgen(inline_js = "export function spread_arguments(forward) { return (...args) => forward(args); }")]
extern "C" {
    /// Wraps `forward` so that it receives all of its call's arguments as one array.
    fn spread_arguments(forward: &Function) -> Function;
}

pub struct JsContract {
    contract: JsValue,
    /// Kept alive for as long as the contract may call them.
    forwarders: RefCell<Vec<Closure<dyn Fn(Array)>>>,
}

impl JsContract {
    pub fn new(contract: JsValue) -> Self {
        Self {
            contract,
            forwarders: RefCell::new(Vec::new()),
        }
    }

    fn method(&self, name: &str) -> Result<Function, JsValue> {
        Reflect::get(&self.contract, &JsValue::from_str(name))?.dyn_into::<Function>()
    }
}

impl EventSource for JsContract {
    fn on(&self, event: LedgerEvent, handler: RawHandler) {
        let forwarder = Closure::<dyn Fn(Array)>::new(move |args: Array| {
            let values: Vec<serde_json::Value> = args.iter().map(|arg| js_to_json(&arg)).collect();
            handler(values.as_slice());
        });

        // contract listeners receive the event's fields as separate arguments
        let listener = spread_arguments(forwarder.as_ref().unchecked_ref());
        let attached = self.method("on").and_then(|on| {
            on.call2(&self.contract, &JsValue::from_str(event.name()), &listener)
        });

        match attached {
            Ok(_) => self.forwarders.borrow_mut().push(forwarder),
            Err(e) => log::error!("Failed to attach {} listener: {e:?}", event.name()),
        }
    }

    fn remove_all_listeners(&self) {
        if let Err(e) = self
            .method("removeAllListeners")
            .and_then(|remove| remove.call0(&self.contract))
        {
            log::error!("Failed to remove contract listeners: {e:?}");
        }
        self.forwarders.borrow_mut().clear();
    }
}

impl SnapshotReader for JsContract {
    async fn read_all(&self) -> Result<Vec<RawTodo>, SnapshotReadError> {
        let promise = self
            .method("getAllTodo")
            .and_then(|get_all| get_all.call0(&self.contract))
            .map_err(transport)?;
        let result = JsFuture::from(Promise::from(promise))
            .await
            .map_err(transport)?;
        let items: Array = result.dyn_into().map_err(transport)?;
        items.iter().map(|item| raw_todo(&item)).collect()
    }
}

fn raw_todo(item: &JsValue) -> Result<RawTodo, SnapshotReadError> {
    let field = |name: &str| {
        Reflect::get(item, &JsValue::from_str(name))
            .map(|value| js_to_json(&value))
            .map_err(transport)
    };
    let json = serde_json::json!({
        "title": field("title")?,
        "description": field("description")?,
        "status": field("status")?,
    });
    Ok(serde_json::from_value(json)?)
}

/// BigInts (how ethers hands over `uint` values) become decimal strings.
fn js_to_json(value: &JsValue) -> serde_json::Value {
    if value.is_bigint() {
        let digits = value
            .clone()
            .unchecked_into::<js_sys::BigInt>()
            .to_string(10)
            .map(String::from)
            .unwrap_or_default();
        return serde_json::Value::String(digits);
    }
    serde_wasm_bindgen::from_value(value.clone()).unwrap_or(serde_json::Value::Null)
}

fn transport(e: JsValue) -> SnapshotReadError {
    SnapshotReadError::Transport(format!("{e:?}"))
}

#[wasm_bindgen]
pub struct TodoSyncHandle {
    sync: TodoSync<JsContract>,
    theme: ThemeState,
}

#[wasm_bindgen]
impl TodoSyncHandle {
    #[wasm_bindgen(constructor)]
    pub fn new(contract: JsValue, config: JsValue) -> Result<TodoSyncHandle, JsValue> {
        crate::init_logging();

        let config: SyncConfig = if config.is_undefined() || config.is_null() {
            SyncConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };

        let bus = Rc::new(EventBus::new());
        let theme = ThemeState::new(bus.clone(), config.default_theme);
        let sync = TodoSync::new(bus, Rc::new(JsContract::new(contract)), &config);
        Ok(Self { sync, theme })
    }

    /// Resolves to true if the snapshot was loaded.
    pub async fn mount(&self) -> bool {
        let contract = self.sync.listener().source().clone();
        matches!(self.sync.mount(&*contract).await, InitOutcome::Loaded(_))
    }

    pub fn unmount(&self) {
        self.sync.unmount();
    }

    pub fn reconnect(&self) {
        self.sync.listener().reconnect();
    }

    /// The current collection as `{ id, todo: { title, description, status } }` objects.
    pub fn todos(&self) -> Result<JsValue, JsValue> {
        let entries: Vec<_> = self.sync.reconciler().entries().into_iter().collect();
        Ok(serde_wasm_bindgen::to_value(&entries)?)
    }

    #[wasm_bindgen(getter)]
    pub fn loaded(&self) -> bool {
        self.sync.reconciler().loaded_at_least_once()
    }

    pub fn subscribe_changes(&self, callback: Function) -> ChangeListenerKey {
        self.sync.reconciler().subscribe_changes(move || {
            if let Err(e) = callback.call0(&JsValue::NULL) {
                log::error!("Change listener threw: {e:?}");
            }
        })
    }

    pub fn unsubscribe_changes(&self, key: ChangeListenerKey) -> bool {
        self.sync.reconciler().unsubscribe_changes(key)
    }

    pub fn theme(&self) -> Theme {
        self.theme.theme()
    }

    pub fn toggle_theme(&self) -> Theme {
        self.theme.toggle()
    }
}
