// quillbase-core/src/value_utils.rs
//! Dot-path resolution and the total order over document values
//!
//! Every comparison in the store (index keys, sorts, range operators) goes
//! through `compare_values`, which implements one total order:
//!
//! `undefined < null < number < string < bool < date < array < object`
//!
//! NaN equals only itself and sorts after every other number. Arrays compare
//! elementwise, objects by their enumerated (key-sorted) pairs.

use crate::document::{date_millis, is_date};
use serde_json::Value;
use std::cmp::Ordering;

/// String ordering used by a collection.
///
/// The case-insensitive variant folds keys at extraction time so index
/// ordering and uniqueness ignore ASCII case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringCollation {
    #[default]
    Binary,
    CaseInsensitive,
}

impl StringCollation {
    pub fn cmp_str(&self, a: &str, b: &str) -> Ordering {
        match self {
            StringCollation::Binary => a.cmp(b),
            StringCollation::CaseInsensitive => {
                a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
            }
        }
    }

    /// Fold a string into its collation key.
    pub fn fold(&self, s: &str) -> String {
        match self {
            StringCollation::Binary => s.to_string(),
            StringCollation::CaseInsensitive => s.to_ascii_lowercase(),
        }
    }
}

/// Resolve a dot path against a document.
///
/// Numeric segments index into arrays. When a non-terminal segment lands on
/// an array, resolution fans out: the result is an array holding the
/// per-element resolutions of the remaining path. A missing segment yields
/// `None`.
pub fn get_path(doc: &Value, path: &str) -> Option<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    resolve(doc, &segments)
}

fn resolve(value: &Value, segments: &[&str]) -> Option<Value> {
    if segments.is_empty() {
        return Some(value.clone());
    }
    match value {
        Value::Object(map) => map
            .get(segments[0])
            .and_then(|next| resolve(next, &segments[1..])),
        Value::Array(items) => {
            if let Ok(index) = segments[0].parse::<usize>() {
                items.get(index).and_then(|next| resolve(next, &segments[1..]))
            } else {
                // Fan out: resolve the full remaining path per element
                let resolved: Vec<Value> = items
                    .iter()
                    .filter_map(|item| resolve(item, segments))
                    .collect();
                Some(Value::Array(resolved))
            }
        }
        _ => None,
    }
}

/// Rank of a value kind in the total order. `undefined` (absence) is handled
/// by `compare_optional` and sorts below everything.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Bool(_) => 3,
        Value::Object(_) if is_date(value) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// Total order over document values (see module docs).
pub fn compare_values(a: &Value, b: &Value, collation: StringCollation) -> Ordering {
    let rank_a = type_rank(a);
    let rank_b = type_rank(b);
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(na), Value::Number(nb)) => {
            compare_numbers(na.as_f64().unwrap_or(f64::NAN), nb.as_f64().unwrap_or(f64::NAN))
        }
        (Value::String(sa), Value::String(sb)) => collation.cmp_str(sa, sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        (Value::Array(aa), Value::Array(ab)) => {
            for (ea, eb) in aa.iter().zip(ab.iter()) {
                let ord = compare_values(ea, eb, collation);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            aa.len().cmp(&ab.len())
        }
        (Value::Object(_), Value::Object(_)) => {
            if rank_a == 4 {
                // Both are date wrappers
                return date_millis(a).cmp(&date_millis(b));
            }
            let ma = a.as_object().unwrap();
            let mb = b.as_object().unwrap();
            for ((ka, va), (kb, vb)) in ma.iter().zip(mb.iter()) {
                let key_ord = ka.cmp(kb);
                if key_ord != Ordering::Equal {
                    return key_ord;
                }
                let val_ord = compare_values(va, vb, collation);
                if val_ord != Ordering::Equal {
                    return val_ord;
                }
            }
            ma.len().cmp(&mb.len())
        }
        _ => unreachable!("ranks matched but kinds differ"),
    }
}

/// NaN equals only itself and sorts after every other number.
fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Comparison where either side may be absent; absence sorts first.
pub fn compare_optional(
    a: Option<&Value>,
    b: Option<&Value>,
    collation: StringCollation,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => compare_values(va, vb, collation),
    }
}

/// Deep equality: `compare_values == Equal` under binary collation.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b, StringCollation::Binary) == Ordering::Equal
}

/// Whether a range operator may compare these two values: both numbers,
/// both strings, or both dates. Unlike kinds never match a range clause.
pub fn comparable(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_)) | (Value::String(_), Value::String(_))
    ) || (is_date(a) && is_date(b))
}
