// quillbase-core/src/update.rs
//! Update documents: replacement vs. modifier evaluation
//!
//! An update document is either all-operator (`$set`, `$inc`, ...) or
//! operator-free; the operator-free form replaces the document. Mixing the
//! two is an error. Modifier paths use dot notation and create intermediate
//! objects as needed.

use crate::document::check_object;
use crate::error::{QuillError, Result};
use crate::value_utils::{compare_values, values_equal, StringCollation};
use serde_json::Value;
use std::cmp::Ordering;

/// Kind of one update operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Set,
    Unset,
    Inc,
    Push,
    AddToSet,
    Pop,
    Pull,
    Min,
    Max,
}

impl ModifierKind {
    fn parse(op: &str) -> Result<ModifierKind> {
        match op {
            "$set" => Ok(ModifierKind::Set),
            "$unset" => Ok(ModifierKind::Unset),
            "$inc" => Ok(ModifierKind::Inc),
            "$push" => Ok(ModifierKind::Push),
            "$addToSet" => Ok(ModifierKind::AddToSet),
            "$pop" => Ok(ModifierKind::Pop),
            "$pull" => Ok(ModifierKind::Pull),
            "$min" => Ok(ModifierKind::Min),
            "$max" => Ok(ModifierKind::Max),
            other => Err(QuillError::InvalidModifier(format!(
                "unknown modifier: {}",
                other
            ))),
        }
    }
}

/// One `(operator, path, argument)` triple
#[derive(Debug, Clone)]
pub struct Modifier {
    pub kind: ModifierKind,
    pub path: String,
    pub arg: Value,
}

/// A parsed update document
#[derive(Debug, Clone)]
pub enum UpdateSpec {
    /// Operator-free form: replaces the document (keeping `_id`)
    Replace(Value),
    /// All-operator form: modifiers applied in order
    Operators(Vec<Modifier>),
}

impl UpdateSpec {
    /// Parse and validate an update document.
    pub fn parse(update: &Value) -> Result<UpdateSpec> {
        let map = update.as_object().ok_or_else(|| {
            QuillError::InvalidModifier("update must be an object".to_string())
        })?;

        let dollar_keys = map.keys().filter(|k| k.starts_with('$')).count();
        if dollar_keys == 0 {
            return Ok(UpdateSpec::Replace(update.clone()));
        }
        if dollar_keys != map.len() {
            return Err(QuillError::InvalidModifier(
                "cannot mix modifiers and plain fields in one update".to_string(),
            ));
        }

        let mut modifiers = Vec::new();
        for (op, fields) in map {
            let kind = ModifierKind::parse(op)?;
            let fields = fields.as_object().ok_or_else(|| {
                QuillError::InvalidModifier(format!("{} takes an object of field paths", op))
            })?;
            for (path, arg) in fields {
                modifiers.push(Modifier {
                    kind,
                    path: path.clone(),
                    arg: arg.clone(),
                });
            }
        }
        Ok(UpdateSpec::Operators(modifiers))
    }

    /// True for the all-operator form.
    pub fn is_operators(&self) -> bool {
        matches!(self, UpdateSpec::Operators(_))
    }

    /// Produce the new version of `old`.
    ///
    /// The result keeps `old`'s `_id` (changing it is an error) and is
    /// validated with `check_object` before being returned.
    pub fn apply(&self, old: &Value) -> Result<Value> {
        let old_id = old.as_object().and_then(|m| m.get("_id")).cloned();
        let mut new = match self {
            UpdateSpec::Replace(replacement) => {
                if let (Some(old_id), Some(new_id)) = (
                    &old_id,
                    replacement.as_object().and_then(|m| m.get("_id")),
                ) {
                    if !values_equal(old_id, new_id) {
                        return Err(QuillError::InvalidModifier(
                            "cannot change a document's _id".to_string(),
                        ));
                    }
                }
                replacement.clone()
            }
            UpdateSpec::Operators(modifiers) => {
                let mut doc = old.clone();
                for modifier in modifiers {
                    apply_modifier(&mut doc, modifier)?;
                }
                doc
            }
        };

        if let Some(old_id) = old_id {
            let map = new.as_object_mut().ok_or_else(|| {
                QuillError::InvalidModifier("updated document must be an object".to_string())
            })?;
            match map.get("_id") {
                Some(new_id) if !values_equal(new_id, &old_id) => {
                    return Err(QuillError::InvalidModifier(
                        "cannot change a document's _id".to_string(),
                    ));
                }
                _ => {
                    map.insert("_id".to_string(), old_id);
                }
            }
        }

        check_object_without_id(&new)?;
        Ok(new)
    }
}

// `_id` may be any primitive, but the rest of the document obeys the field
// naming rules.
fn check_object_without_id(doc: &Value) -> Result<()> {
    if let Some(map) = doc.as_object() {
        for (key, value) in map {
            if key == "_id" {
                continue;
            }
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
            check_object(value)?;
        }
    }
    Ok(())
}

fn apply_modifier(doc: &mut Value, modifier: &Modifier) -> Result<()> {
    let path = modifier.path.as_str();
    let arg = &modifier.arg;
    match modifier.kind {
        ModifierKind::Set => {
            set_path(doc, path, arg.clone());
            Ok(())
        }
        ModifierKind::Unset => {
            unset_path(doc, path);
            Ok(())
        }
        ModifierKind::Inc => apply_inc(doc, path, arg),
        ModifierKind::Min => apply_min_max(doc, path, arg, Ordering::Less),
        ModifierKind::Max => apply_min_max(doc, path, arg, Ordering::Greater),
        ModifierKind::Push => apply_push(doc, path, arg),
        ModifierKind::AddToSet => apply_add_to_set(doc, path, arg),
        ModifierKind::Pop => apply_pop(doc, path, arg),
        ModifierKind::Pull => apply_pull(doc, path, arg),
    }
}

fn apply_inc(doc: &mut Value, path: &str, arg: &Value) -> Result<()> {
    let delta = arg.as_f64().ok_or_else(|| {
        QuillError::InvalidModifier("$inc takes a numeric argument".to_string())
    })?;
    match get_mut_at_path(doc, path) {
        Some(slot) => match slot {
            Value::Number(current) => {
                // Keep integer arithmetic when both sides are integers
                let next = match (current.as_i64(), arg.as_i64()) {
                    (Some(a), Some(b)) => Value::from(a + b),
                    _ => Value::from(current.as_f64().unwrap_or(f64::NAN) + delta),
                };
                *slot = next;
                Ok(())
            }
            _ => Err(QuillError::InvalidModifier(format!(
                "cannot $inc non-numeric field '{}'",
                path
            ))),
        },
        None => {
            set_path(doc, path, arg.clone());
            Ok(())
        }
    }
}

fn apply_min_max(doc: &mut Value, path: &str, arg: &Value, keep_when: Ordering) -> Result<()> {
    match get_mut_at_path(doc, path) {
        Some(slot) => {
            if compare_values(arg, slot, StringCollation::Binary) == keep_when {
                *slot = arg.clone();
            }
            Ok(())
        }
        None => {
            set_path(doc, path, arg.clone());
            Ok(())
        }
    }
}

fn apply_push(doc: &mut Value, path: &str, arg: &Value) -> Result<()> {
    let (items, slice) = parse_each(arg, "$push")?;
    let slot = ensure_array_at(doc, path, "$push")?;
    if let Value::Array(arr) = slot {
        arr.extend(items);
        if let Some(n) = slice {
            apply_slice(arr, n);
        }
    }
    Ok(())
}

fn apply_add_to_set(doc: &mut Value, path: &str, arg: &Value) -> Result<()> {
    let (items, slice) = parse_each(arg, "$addToSet")?;
    if slice.is_some() {
        return Err(QuillError::InvalidModifier(
            "$slice is only supported in $push".to_string(),
        ));
    }
    let slot = ensure_array_at(doc, path, "$addToSet")?;
    if let Value::Array(arr) = slot {
        for item in items {
            if !arr.iter().any(|held| values_equal(held, &item)) {
                arr.push(item);
            }
        }
    }
    Ok(())
}

fn apply_pop(doc: &mut Value, path: &str, arg: &Value) -> Result<()> {
    let direction = arg.as_i64().ok_or_else(|| {
        QuillError::InvalidModifier("$pop takes 1 (last) or -1 (first)".to_string())
    })?;
    if direction != 1 && direction != -1 {
        return Err(QuillError::InvalidModifier(
            "$pop takes 1 (last) or -1 (first)".to_string(),
        ));
    }
    match get_mut_at_path(doc, path) {
        Some(Value::Array(arr)) => {
            if !arr.is_empty() {
                if direction == 1 {
                    arr.pop();
                } else {
                    arr.remove(0);
                }
            }
            Ok(())
        }
        _ => Err(QuillError::InvalidModifier(format!(
            "cannot $pop from non-array field '{}'",
            path
        ))),
    }
}

fn apply_pull(doc: &mut Value, path: &str, arg: &Value) -> Result<()> {
    match get_mut_at_path(doc, path) {
        Some(Value::Array(arr)) => {
            // Equality matching only; operator sub-queries are not supported
            arr.retain(|held| !values_equal(held, arg));
            Ok(())
        }
        _ => Err(QuillError::InvalidModifier(format!(
            "cannot $pull from non-array field '{}'",
            path
        ))),
    }
}

/// Decode `$each`/`$slice` forms; a plain argument is a single item.
fn parse_each(arg: &Value, op: &str) -> Result<(Vec<Value>, Option<i64>)> {
    if let Value::Object(map) = arg {
        if map.contains_key("$each") {
            let items = map
                .get("$each")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    QuillError::InvalidModifier(format!("$each in {} takes an array", op))
                })?
                .clone();
            let mut slice = None;
            for (key, value) in map {
                match key.as_str() {
                    "$each" => {}
                    "$slice" => {
                        slice = Some(value.as_i64().ok_or_else(|| {
                            QuillError::InvalidModifier("$slice takes an integer".to_string())
                        })?);
                    }
                    other => {
                        return Err(QuillError::InvalidModifier(format!(
                            "unsupported option {} in {}",
                            other, op
                        )));
                    }
                }
            }
            return Ok((items, slice));
        }
        if map.contains_key("$slice") {
            return Err(QuillError::InvalidModifier(
                "$slice requires $each".to_string(),
            ));
        }
    }
    Ok((vec![arg.clone()], None))
}

/// `$slice` semantics: 0 empties, n>0 keeps the first n, n<0 keeps the last |n|.
fn apply_slice(arr: &mut Vec<Value>, n: i64) {
    if n == 0 {
        arr.clear();
    } else if n > 0 {
        arr.truncate(n as usize);
    } else {
        let keep = (-n) as usize;
        if arr.len() > keep {
            let drop = arr.len() - keep;
            arr.drain(..drop);
        }
    }
}

fn ensure_array_at<'a>(doc: &'a mut Value, path: &str, op: &str) -> Result<&'a mut Value> {
    if get_mut_at_path(doc, path).is_none() {
        set_path(doc, path, Value::Array(Vec::new()));
    }
    let slot = get_mut_at_path(doc, path).ok_or_else(|| {
        QuillError::InvalidModifier(format!("cannot reach field '{}'", path))
    })?;
    if !slot.is_array() {
        return Err(QuillError::InvalidModifier(format!(
            "cannot {} on non-array field '{}'",
            op, path
        )));
    }
    Ok(slot)
}

// ============================================================================
// PATH NAVIGATION (objects descend by key, arrays by numeric segment)
// ============================================================================

/// Set a value at a dot path, creating intermediate objects as needed.
pub fn set_path(doc: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    set_at(doc, &segments, value);
}

fn set_at(current: &mut Value, segments: &[&str], value: Value) {
    if segments.is_empty() {
        *current = value;
        return;
    }
    let head = segments[0];
    if segments.len() == 1 {
        match current {
            Value::Object(map) => {
                map.insert(head.to_string(), value);
            }
            Value::Array(arr) => {
                if let Ok(index) = head.parse::<usize>() {
                    if index < arr.len() {
                        arr[index] = value;
                    }
                }
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(head.to_string(), value);
                *current = Value::Object(map);
            }
        }
        return;
    }
    match current {
        Value::Object(map) => {
            let next = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            set_at(next, &segments[1..], value);
        }
        Value::Array(arr) => {
            if let Ok(index) = head.parse::<usize>() {
                if index < arr.len() {
                    set_at(&mut arr[index], &segments[1..], value);
                }
            }
        }
        _ => {
            *current = Value::Object(serde_json::Map::new());
            set_at(current, segments, value);
        }
    }
}

/// Remove the value at a dot path; missing segments are a no-op.
pub fn unset_path(doc: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    unset_at(doc, &segments);
}

fn unset_at(current: &mut Value, segments: &[&str]) {
    if segments.is_empty() {
        return;
    }
    let head = segments[0];
    if segments.len() == 1 {
        match current {
            Value::Object(map) => {
                map.remove(head);
            }
            Value::Array(arr) => {
                if let Ok(index) = head.parse::<usize>() {
                    if index < arr.len() {
                        arr.remove(index);
                    }
                }
            }
            _ => {}
        }
        return;
    }
    match current {
        Value::Object(map) => {
            if let Some(next) = map.get_mut(head) {
                unset_at(next, &segments[1..]);
            }
        }
        Value::Array(arr) => {
            if let Ok(index) = head.parse::<usize>() {
                if index < arr.len() {
                    unset_at(&mut arr[index], &segments[1..]);
                }
            }
        }
        _ => {}
    }
}

/// Mutable reference to the value at a dot path (no fan-out, no creation).
pub fn get_mut_at_path<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(arr) => {
                let index = segment.parse::<usize>().ok()?;
                arr.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}
