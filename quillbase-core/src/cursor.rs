// quillbase-core/src/cursor.rs
//! Lazy query pipeline
//!
//! A cursor is a builder bound to a collection and a raw query. Nothing runs
//! until `exec()`: candidates → match filter → (sort → skip/limit, or
//! streaming skip/limit) → projection. Returned documents are deep copies,
//! so callers cannot corrupt the cache.

use crate::collection::Collection;
use crate::error::{QuillError, Result};
use crate::query::Query;
use crate::update::set_path;
use crate::value_utils::{compare_optional, get_path, StringCollation};
use serde_json::Value;
use std::collections::HashMap;

/// Builder for one query execution.
pub struct Cursor<'a> {
    collection: &'a Collection,
    query: Value,
    limit: Option<usize>,
    skip: Option<usize>,
    sort: Option<Vec<(String, i32)>>,
    projection: Option<HashMap<String, i32>>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(collection: &'a Collection, query: Value) -> Cursor<'a> {
        Cursor {
            collection,
            query,
            limit: None,
            skip: None,
            sort: None,
            projection: None,
        }
    }

    /// Keep at most `n` documents.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Drop the first `n` matching documents.
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Sort by dot paths in order; direction is `1` (ascending) or `-1`
    /// (descending). Ordering of documents with equal keys is unspecified.
    pub fn sort(mut self, spec: Vec<(String, i32)>) -> Self {
        self.sort = Some(spec);
        self
    }

    /// Field projection: all values `1` (pick) or all `0` (omit); `_id` may
    /// take the opposite polarity.
    pub fn projection(mut self, spec: HashMap<String, i32>) -> Self {
        self.projection = Some(spec);
        self
    }

    /// Run the pipeline and collect the results.
    pub fn exec(&self) -> Result<Vec<Value>> {
        let query = Query::parse(&self.query)?;
        let skip = self.skip.unwrap_or(0);

        let mut docs = match &self.sort {
            Some(spec) => {
                // Sorting needs the full filtered set
                let mut all = self.collection.collect_matching(&query, None)?;
                sort_documents(&mut all, spec, self.collection.collation());
                apply_skip_limit(all, skip, self.limit)
            }
            None => {
                // Without a sort the walk can stop early
                let stop_after = self.limit.map(|limit| skip.saturating_add(limit));
                let all = self.collection.collect_matching(&query, stop_after)?;
                apply_skip_limit(all, skip, self.limit)
            }
        };

        if let Some(projection) = &self.projection {
            let mut projected = Vec::with_capacity(docs.len());
            for doc in &docs {
                projected.push(apply_projection(doc, projection)?);
            }
            docs = projected;
        }
        Ok(docs)
    }
}

fn apply_skip_limit(docs: Vec<Value>, skip: usize, limit: Option<usize>) -> Vec<Value> {
    let mut iter = docs.into_iter().skip(skip);
    match limit {
        Some(limit) => iter.by_ref().take(limit).collect(),
        None => iter.collect(),
    }
}

/// Sort in place by the given `(path, direction)` pairs.
pub(crate) fn sort_documents(
    docs: &mut [Value],
    spec: &[(String, i32)],
    collation: StringCollation,
) {
    if spec.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (path, direction) in spec {
            let va = get_path(a, path);
            let vb = get_path(b, path);
            let ord = compare_optional(va.as_ref(), vb.as_ref(), collation);
            if ord != std::cmp::Ordering::Equal {
                return if *direction >= 0 { ord } else { ord.reverse() };
            }
        }
        std::cmp::Ordering::Equal
    });
}

/// Apply a projection to one document.
///
/// An empty projection is the identity. Values must all be `1` (pick) or all
/// `0` (omit); `_id` alone may take the opposite polarity and is kept unless
/// explicitly excluded.
pub(crate) fn apply_projection(
    doc: &Value,
    projection: &HashMap<String, i32>,
) -> Result<Value> {
    if projection.is_empty() {
        return Ok(doc.clone());
    }
    for (field, action) in projection {
        if *action != 0 && *action != 1 {
            return Err(QuillError::InvalidProjection(format!(
                "projection value for '{}' must be 0 or 1",
                field
            )));
        }
    }

    let picks: Vec<&String> = projection
        .iter()
        .filter(|(field, action)| field.as_str() != "_id" && **action == 1)
        .map(|(field, _)| field)
        .collect();
    let omits: Vec<&String> = projection
        .iter()
        .filter(|(field, action)| field.as_str() != "_id" && **action == 0)
        .map(|(field, _)| field)
        .collect();
    if !picks.is_empty() && !omits.is_empty() {
        return Err(QuillError::InvalidProjection(
            "cannot mix picks and omissions outside _id".to_string(),
        ));
    }

    let id_action = projection.get("_id").copied();
    // With only _id in the projection, its value decides the mode
    let pick_mode = if picks.is_empty() && omits.is_empty() {
        id_action == Some(1)
    } else {
        !picks.is_empty()
    };

    if pick_mode {
        let mut result = Value::Object(serde_json::Map::new());
        for path in picks {
            if let Some(value) = get_path(doc, path) {
                set_path(&mut result, path, value);
            }
        }
        if id_action != Some(0) {
            if let Some(id) = doc.as_object().and_then(|m| m.get("_id")) {
                set_path(&mut result, "_id", id.clone());
            }
        }
        Ok(result)
    } else {
        let mut result = doc.clone();
        for path in omits {
            crate::update::unset_path(&mut result, path);
        }
        if id_action == Some(0) {
            crate::update::unset_path(&mut result, "_id");
        }
        Ok(result)
    }
}
