//! # Ledger
//! The two narrow interfaces through which the outside world reaches the sync core:
//! a [`SnapshotReader`] for the bulk read and an [`EventSource`] for change notifications.
//!
//! Both speak the ledger's raw shapes. Integers the ledger produces are unsigned 256-bit values on-chain, so
//! clients hand them over either as plain JSON numbers or as decimal strings; [`integer_from_json`] accepts both.

use std::future::Future;
use std::rc::Rc;

use serde::{Deserialize, Deserializer, Serialize};

use crate::events::LedgerEvent;

/// One item of the ledger's bulk read, before its status has been decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTodo {
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotReadError {
    #[error("snapshot read failed: {0}")]
    Transport(String),
    #[error("snapshot response was malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub trait SnapshotReader {
    /// Reads the ledger's whole collection, in ledger order.
    fn read_all(&self) -> impl Future<Output = Result<Vec<RawTodo>, SnapshotReadError>>;
}

/// Receives the positional arguments of one notification.
pub type RawHandler = Rc<dyn Fn(&[serde_json::Value])>;

/// A push-based notification source. Delivery is asynchronous, only FIFO per event kind, and notifications
/// emitted while nobody was listening are never replayed.
pub trait EventSource {
    fn on(&self, event: LedgerEvent, handler: RawHandler);
    fn remove_all_listeners(&self);
}

impl<S: EventSource + ?Sized> EventSource for Rc<S> {
    fn on(&self, event: LedgerEvent, handler: RawHandler) {
        (**self).on(event, handler)
    }

    fn remove_all_listeners(&self) {
        (**self).remove_all_listeners()
    }
}

/// Reads an integer the way the ledger's clients encode them: a JSON number (fractional values are truncated
/// toward zero) or a decimal / `0x`-prefixed hex string. Values beyond `i128` saturate.
pub fn integer_from_json(value: &serde_json::Value) -> Option<i128> {
    match value {
        serde_json::Value::Number(number) => {
            if let Some(n) = number.as_i64() {
                Some(n.into())
            } else if let Some(n) = number.as_u64() {
                Some(n.into())
            } else {
                number.as_f64().and_then(truncate)
            }
        }
        serde_json::Value::String(s) => integer_from_str(s.trim()),
        _ => None,
    }
}

fn integer_from_str(s: &str) -> Option<i128> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        // `from_str_radix` would also take a sign here
        if !is_digits(hex, 16) {
            return None;
        }
        return Some(i128::from_str_radix(hex, 16).unwrap_or(i128::MAX));
    }
    s.parse::<i128>()
        .ok()
        .or_else(|| {
            let digits = s.strip_prefix('-').unwrap_or(s);
            is_digits(digits, 10).then(|| if s.starts_with('-') { i128::MIN } else { i128::MAX })
        })
        .or_else(|| s.parse::<f64>().ok().and_then(truncate))
}

fn is_digits(s: &str, radix: u32) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_digit(radix))
}

fn truncate(n: f64) -> Option<i128> {
    // `as` saturates at the bounds
    n.is_finite().then(|| n.trunc() as i128)
}

/// Saturates into `i64`; anything that far out of range decodes to `Pending` anyway.
pub(crate) fn saturating_i64(n: i128) -> i64 {
    i64::try_from(n).unwrap_or(if n < 0 { i64::MIN } else { i64::MAX })
}

fn deserialize_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    integer_from_json(&value)
        .map(saturating_i64)
        .ok_or_else(|| serde::de::Error::custom(format!("status is not an integer: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_integer_encodings() {
        assert_eq!(integer_from_json(&json!(3)), Some(3));
        assert_eq!(integer_from_json(&json!(-1)), Some(-1));
        assert_eq!(integer_from_json(&json!(u64::MAX)), Some(u64::MAX as i128));
        assert_eq!(integer_from_json(&json!(2.9)), Some(2));
        assert_eq!(integer_from_json(&json!(-2.9)), Some(-2));
        assert_eq!(integer_from_json(&json!("42")), Some(42));
        assert_eq!(integer_from_json(&json!(" 7 ")), Some(7));
        assert_eq!(integer_from_json(&json!("0x1f")), Some(31));
        assert_eq!(integer_from_json(&json!("1.5")), Some(1));
    }

    #[test]
    fn test_huge_integers_saturate() {
        let uint256_max =
            "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(integer_from_json(&json!(uint256_max)), Some(i128::MAX));
        assert_eq!(saturating_i64(i128::MAX), i64::MAX);
        assert_eq!(saturating_i64(i128::MIN), i64::MIN);
    }

    #[test]
    fn test_non_integers() {
        assert_eq!(integer_from_json(&json!("three")), None);
        assert_eq!(integer_from_json(&json!("")), None);
        assert_eq!(integer_from_json(&json!(null)), None);
        assert_eq!(integer_from_json(&json!(true)), None);
        assert_eq!(integer_from_json(&json!([1])), None);
    }

    #[test]
    fn test_hex_rejects_signs() {
        assert_eq!(integer_from_json(&json!("0x-1f")), None);
        assert_eq!(integer_from_json(&json!("0x+1f")), None);
        assert_eq!(integer_from_json(&json!("0x")), None);
        assert_eq!(integer_from_json(&json!("0xFF")), Some(255));
    }

    #[test]
    fn test_raw_todo_deserializes_big_number_status() {
        let raw: RawTodo = serde_json::from_value(json!({
            "title": "Buy milk",
            "description": "",
            "status": "2",
        }))
        .unwrap();
        assert_eq!(raw.status, 2);

        let err = serde_json::from_value::<RawTodo>(json!({
            "title": "Buy milk",
            "description": "",
            "status": "done",
        }));
        assert!(err.is_err());
    }
}
