//! # Status
//! The ledger stores a todo's status as a small integer. Only the reconciler turns it into a [`TodoStatus`];
//! everything on the bus still carries the raw code.

use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[cfg_attr(target_arch = "wasm32", derive(tsify::Tsify))]
#[cfg_attr(target_arch = "wasm32", tsify(into_wasm_abi, from_wasm_abi))]
pub enum TodoStatus {
    #[default]
    Pending,
    Created,
    Edited,
    Completed,
}

impl TodoStatus {
    pub fn label(self) -> &'static str {
        match self {
            TodoStatus::Pending => "Pending",
            TodoStatus::Created => "Created",
            TodoStatus::Edited => "Edited",
            TodoStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Total: codes the ledger doesn't define fall back to `Pending` so an unknown status never breaks rendering.
pub fn decode_status(code: i64) -> TodoStatus {
    match code {
        1 => TodoStatus::Created,
        2 => TodoStatus::Edited,
        3 => TodoStatus::Completed,
        _ => TodoStatus::Pending,
    }
}
