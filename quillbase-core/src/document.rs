// quillbase-core/src/document.rs
// Document identity, field-name validation and date scalars

use crate::error::{QuillError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

/// Length of generated `_id` strings.
pub const DOC_ID_LEN: usize = 16;

/// Key of the JSON wrapper object that encodes a date scalar.
///
/// Dates keep this shape both in memory and on disk, so a document
/// round-trips through the datafile without a conversion step.
pub const DATE_KEY: &str = "$$date";

/// Handle into the document arena.
///
/// The arena owns every live document; the `_id` index and all secondary
/// indexes refer to documents through this handle only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(u64);

impl DocId {
    pub fn new(raw: u64) -> Self {
        DocId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Generate a fresh `_id`: 16 random alphanumeric characters.
///
/// Collisions are handled by the caller (regenerate until unused).
pub fn generate_doc_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOC_ID_LEN)
        .map(char::from)
        .collect()
}

/// True when `value` is the date wrapper `{"$$date": <epoch-ms>}`.
pub fn is_date(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get(DATE_KEY).map_or(false, Value::is_number),
        _ => false,
    }
}

/// Epoch milliseconds of a date wrapper, `None` for anything else.
pub fn date_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(DATE_KEY)?.as_i64(),
        _ => None,
    }
}

/// Build a date scalar from epoch milliseconds.
pub fn date_value(millis: i64) -> Value {
    serde_json::json!({ DATE_KEY: millis })
}

/// Current wall-clock time as a date scalar.
pub fn date_now() -> Value {
    date_value(now_millis())
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Validate a document (or sub-document) before it enters the store.
///
/// No key may start with `$` and no key may contain `.` (dots are reserved
/// as path separators). The date wrapper is a scalar and is exempt.
pub fn check_object(value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => {
            if is_date(value) {
                return Ok(());
            }
            for (key, sub) in map {
                if key.starts_with('$') {
                    return Err(QuillError::InvalidFieldName(format!(
                        "field names cannot begin with '$': {}",
                        key
                    )));
                }
                if key.contains('.') {
                    return Err(QuillError::InvalidFieldName(format!(
                        "field names cannot contain '.': {}",
                        key
                    )));
                }
                check_object(sub)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check_object(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// The `_id` of a document, if present.
pub fn doc_id_value(doc: &Value) -> Option<&Value> {
    doc.as_object()?.get("_id")
}
