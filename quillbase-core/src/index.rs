// quillbase-core/src/index.rs
// Ordered secondary indexes over the document arena

use crate::document::{date_millis, is_date, DocId};
use crate::error::{QuillError, Result};
use crate::value_utils::{get_path, StringCollation};
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

/// Index key - the ordered form of an extracted field value
///
/// The variant order IS the sort order:
/// undefined < null < number < string < bool < date < array < object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    /// Sentinel for documents missing the field (non-sparse indexes only)
    Undefined,
    Null,
    Number(OrderedFloat),
    String(String),
    Bool(bool),
    /// Epoch milliseconds
    Date(i64),
    Array(Vec<IndexKey>),
    Object(Vec<(String, IndexKey)>),
}

/// OrderedFloat wrapper for f64 to enable Ord
///
/// NaN equals only itself and sorts after every other number.
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => self
                .0
                .partial_cmp(&other.0)
                .unwrap_or(std::cmp::Ordering::Equal),
        }
    }
}

impl IndexKey {
    /// Convert a document value into an index key.
    ///
    /// Strings fold through the collation so a case-insensitive collection
    /// orders and dedups keys without regard to ASCII case.
    pub fn from_value(value: &Value, collation: StringCollation) -> IndexKey {
        if is_date(value) {
            if let Some(ms) = date_millis(value) {
                return IndexKey::Date(ms);
            }
        }
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => IndexKey::Number(OrderedFloat(n.as_f64().unwrap_or(f64::NAN))),
            Value::String(s) => IndexKey::String(collation.fold(s)),
            Value::Array(items) => IndexKey::Array(
                items
                    .iter()
                    .map(|item| IndexKey::from_value(item, collation))
                    .collect(),
            ),
            Value::Object(map) => IndexKey::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), IndexKey::from_value(v, collation)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Undefined => write!(f, "undefined"),
            IndexKey::Null => write!(f, "null"),
            IndexKey::Number(n) => write!(f, "{}", n.0),
            IndexKey::String(s) => write!(f, "\"{}\"", s),
            IndexKey::Bool(b) => write!(f, "{}", b),
            IndexKey::Date(ms) => write!(f, "Date({})", ms),
            IndexKey::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            IndexKey::Object(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Options describing one index, in the shape journaled to the datafile
/// (`$$indexCreated` records).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexOptions {
    #[serde(rename = "fieldName")]
    pub field_name: String,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub sparse: bool,
    #[serde(
        rename = "expireAfterSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expire_after_seconds: Option<f64>,
}

impl IndexOptions {
    pub fn new(field_name: impl Into<String>) -> Self {
        IndexOptions {
            field_name: field_name.into(),
            unique: false,
            sparse: false,
            expire_after_seconds: None,
        }
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn with_expire_after_seconds(mut self, seconds: f64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }
}

/// Range query bounds for `get_between_bounds`
#[derive(Debug, Clone, Default)]
pub struct KeyBounds {
    pub gt: Option<IndexKey>,
    pub gte: Option<IndexKey>,
    pub lt: Option<IndexKey>,
    pub lte: Option<IndexKey>,
}

/// One ordered index: extracted key → document handles.
///
/// Duplicate keys hold their handles in a list per tree node; uniqueness is
/// checked before any mutation so a failed insert leaves no residue.
pub struct Index {
    options: IndexOptions,
    collation: StringCollation,
    entries: BTreeMap<IndexKey, Vec<DocId>>,
}

impl Index {
    pub fn new(options: IndexOptions, collation: StringCollation) -> Self {
        Index {
            options,
            collation,
            entries: BTreeMap::new(),
        }
    }

    pub fn field_name(&self) -> &str {
        &self.options.field_name
    }

    pub fn unique(&self) -> bool {
        self.options.unique
    }

    pub fn sparse(&self) -> bool {
        self.options.sparse
    }

    pub fn expire_after_seconds(&self) -> Option<f64> {
        self.options.expire_after_seconds
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Number of distinct keys currently held.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop every entry, keeping the definition.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The keys a document files under, deduplicated.
    ///
    /// `None` means the document is not indexed at all (sparse index,
    /// missing field). An array field produces one key per element; an
    /// empty array produces no keys.
    fn extract_keys(&self, doc: &Value) -> Option<Vec<IndexKey>> {
        match get_path(doc, &self.options.field_name) {
            None => {
                if self.options.sparse {
                    None
                } else {
                    Some(vec![IndexKey::Undefined])
                }
            }
            Some(Value::Array(items)) => {
                let mut keys: Vec<IndexKey> = items
                    .iter()
                    .map(|item| IndexKey::from_value(item, self.collation))
                    .collect();
                keys.sort();
                keys.dedup();
                Some(keys)
            }
            Some(value) => Some(vec![IndexKey::from_value(&value, self.collation)]),
        }
    }

    /// Insert a document reference under its extracted key(s).
    ///
    /// Unique constraints are checked for every key before the first
    /// mutation, so failure leaves the index untouched.
    pub fn insert(&mut self, doc: &Value, id: DocId) -> Result<()> {
        let keys = match self.extract_keys(doc) {
            Some(keys) => keys,
            None => return Ok(()),
        };
        if self.options.unique {
            for key in &keys {
                if self.entries.get(key).is_some_and(|ids| !ids.is_empty()) {
                    return Err(QuillError::UniqueViolated {
                        field: self.options.field_name.clone(),
                        key: key.to_string(),
                    });
                }
            }
        }
        for key in keys {
            self.entries.entry(key).or_default().push(id);
        }
        Ok(())
    }

    /// Re-insert a state known to have been valid (rollback path); skips the
    /// unique check.
    fn force_insert(&mut self, doc: &Value, id: DocId) {
        if let Some(keys) = self.extract_keys(doc) {
            for key in keys {
                self.entries.entry(key).or_default().push(id);
            }
        }
    }

    /// Remove a document reference from all of its keys.
    pub fn remove(&mut self, doc: &Value, id: DocId) {
        let keys = match self.extract_keys(doc) {
            Some(keys) => keys,
            None => return,
        };
        for key in keys {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.retain(|held| *held != id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Replace `old` with `new` for one document; on a constraint failure
    /// `old` is restored and the error propagated.
    pub fn update(&mut self, old: &Value, new: &Value, id: DocId) -> Result<()> {
        self.remove(old, id);
        if let Err(err) = self.insert(new, id) {
            self.force_insert(old, id);
            return Err(err);
        }
        Ok(())
    }

    /// Apply a batch of `(id, old, new)` pairs; on any failure every
    /// completed pair is reverted before the error propagates.
    pub fn update_batch(&mut self, pairs: &[(DocId, Value, Value)]) -> Result<()> {
        for (done, (id, old, new)) in pairs.iter().enumerate() {
            if let Err(err) = self.update(old, new, *id) {
                for (id, old, new) in pairs[..done].iter().rev() {
                    self.revert_update(old, new, *id);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// Swap a previously applied update back (multi-index rollback).
    pub fn revert_update(&mut self, old: &Value, new: &Value, id: DocId) {
        self.remove(new, id);
        self.force_insert(old, id);
    }

    /// Handles filed under a key equal to `value`. An array value unions
    /// the per-element matches, deduplicated.
    pub fn get_matching(&self, value: &Value) -> Vec<DocId> {
        match value {
            Value::Array(items) => {
                let values: Vec<&Value> = items.iter().collect();
                self.get_matching_any(&values)
            }
            _ => {
                let key = IndexKey::from_value(value, self.collation);
                self.entries.get(&key).cloned().unwrap_or_default()
            }
        }
    }

    /// Union of matches over several candidate values (the `$in` path).
    pub fn get_matching_any(&self, values: &[&Value]) -> Vec<DocId> {
        let mut seen: AHashSet<DocId> = AHashSet::new();
        let mut out = Vec::new();
        for value in values {
            let key = IndexKey::from_value(value, self.collation);
            if let Some(ids) = self.entries.get(&key) {
                for id in ids {
                    if seen.insert(*id) {
                        out.push(*id);
                    }
                }
            }
        }
        out
    }

    /// Ordered range scan between the given bounds.
    pub fn get_between_bounds(&self, bounds: &KeyBounds) -> Vec<DocId> {
        // Tighter of $gt/$gte wins; on a tie the exclusive bound wins.
        let lower: Bound<&IndexKey> = match (&bounds.gt, &bounds.gte) {
            (Some(gt), Some(gte)) => {
                if gt >= gte {
                    Bound::Excluded(gt)
                } else {
                    Bound::Included(gte)
                }
            }
            (Some(gt), None) => Bound::Excluded(gt),
            (None, Some(gte)) => Bound::Included(gte),
            (None, None) => Bound::Unbounded,
        };
        let upper: Bound<&IndexKey> = match (&bounds.lt, &bounds.lte) {
            (Some(lt), Some(lte)) => {
                if lt <= lte {
                    Bound::Excluded(lt)
                } else {
                    Bound::Included(lte)
                }
            }
            (Some(lt), None) => Bound::Excluded(lt),
            (None, Some(lte)) => Bound::Included(lte),
            (None, None) => Bound::Unbounded,
        };
        // BTreeMap::range panics on inverted bounds; an empty window is just
        // an empty result
        if let (
            Bound::Included(lo) | Bound::Excluded(lo),
            Bound::Included(hi) | Bound::Excluded(hi),
        ) = (&lower, &upper)
        {
            if lo > hi {
                return Vec::new();
            }
            if lo == hi
                && matches!(
                    (&lower, &upper),
                    (Bound::Excluded(_), Bound::Excluded(_))
                )
            {
                return Vec::new();
            }
        }
        let mut out = Vec::new();
        for (_key, ids) in self.entries.range::<IndexKey, _>((lower, upper)) {
            out.extend_from_slice(ids);
        }
        out
    }

    /// Every handle, in key order.
    pub fn get_all(&self) -> Vec<DocId> {
        let mut out = Vec::new();
        for ids in self.entries.values() {
            out.extend_from_slice(ids);
        }
        out
    }
}
