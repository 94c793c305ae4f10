// quillbase-core/src/query.rs
//! MongoDB-style query language
//!
//! A raw JSON query is parsed once into a tagged tree (`Query` → `Clause` →
//! `FieldOp`); validation happens at parse time, so matching a parsed query
//! against candidate documents is infallible. The collection's candidate
//! planner inspects the same tree to pick an index.

use crate::document::is_date;
use crate::error::{QuillError, Result};
use crate::value_utils::{comparable, compare_values, get_path, values_equal, StringCollation};
use lazy_static::lazy_static;
use lru::LruCache;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::Mutex;

lazy_static! {
    /// Compiled-pattern cache; `Regex::new` is expensive and queries repeat.
    static ref REGEX_CACHE: Mutex<LruCache<String, Regex>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(100).unwrap()));
}

/// Get or compile a regex pattern with caching
fn get_or_compile_regex(pattern: &str) -> Result<Regex> {
    {
        let mut cache = REGEX_CACHE.lock().unwrap();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }
    }
    let regex = Regex::new(pattern).map_err(|e| {
        QuillError::InvalidQuery(format!("invalid $regex pattern '{}': {}", pattern, e))
    })?;
    let mut cache = REGEX_CACHE.lock().unwrap();
    cache.put(pattern.to_string(), regex.clone());
    Ok(regex)
}

/// One operator applied to a field value
#[derive(Debug, Clone)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex(Regex),
    Size(usize),
    ElemMatch(Query),
}

/// What a field clause tests
#[derive(Debug, Clone)]
pub enum FieldTest {
    /// `{field: value}` — equality with array-element fallback
    Equals(Value),
    /// `{field: {$op: v, ...}}` — every operator must hold
    Ops(Vec<FieldOp>),
}

/// One top-level clause
#[derive(Debug, Clone)]
pub enum Clause {
    Field { path: String, test: FieldTest },
    And(Vec<Query>),
    Or(Vec<Query>),
    Nor(Vec<Query>),
    Not(Box<Query>),
}

/// A parsed query. A document matches iff every clause matches.
#[derive(Debug, Clone, Default)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// Parse and validate a raw JSON query.
    pub fn parse(raw: &Value) -> Result<Query> {
        let map = raw
            .as_object()
            .ok_or_else(|| QuillError::InvalidQuery("query must be an object".to_string()))?;

        let mut clauses = Vec::with_capacity(map.len());
        for (key, value) in map {
            if let Some(stripped) = key.strip_prefix('$') {
                clauses.push(parse_logical(stripped, value)?);
            } else {
                clauses.push(Clause::Field {
                    path: key.clone(),
                    test: parse_field_test(key, value)?,
                });
            }
        }
        Ok(Query { clauses })
    }

    /// The parsed top-level clauses (used by the candidate planner).
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when the query has no clauses (matches everything).
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Match a document; infallible once parsed.
    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }
}

fn parse_logical(name: &str, value: &Value) -> Result<Clause> {
    match name {
        "or" | "and" | "nor" => {
            let items = value.as_array().ok_or_else(|| {
                QuillError::InvalidQuery(format!("${} takes an array of queries", name))
            })?;
            let mut queries = Vec::with_capacity(items.len());
            for item in items {
                queries.push(Query::parse(item)?);
            }
            Ok(match name {
                "or" => Clause::Or(queries),
                "and" => Clause::And(queries),
                _ => Clause::Nor(queries),
            })
        }
        "not" => {
            if !value.is_object() {
                return Err(QuillError::InvalidQuery(
                    "$not takes a query object".to_string(),
                ));
            }
            Ok(Clause::Not(Box::new(Query::parse(value)?)))
        }
        other => Err(QuillError::InvalidQuery(format!(
            "unknown logical operator: ${}",
            other
        ))),
    }
}

fn parse_field_test(field: &str, value: &Value) -> Result<FieldTest> {
    // A date wrapper is a scalar operand, not an operator object
    if let Value::Object(map) = value {
        if !is_date(value) {
            let dollar_keys = map.keys().filter(|k| k.starts_with('$')).count();
            if dollar_keys > 0 {
                if dollar_keys != map.len() {
                    return Err(QuillError::InvalidQuery(format!(
                        "cannot mix operators and plain values in clause for '{}'",
                        field
                    )));
                }
                let mut ops = Vec::with_capacity(map.len());
                for (op, operand) in map {
                    ops.push(parse_op(op, operand)?);
                }
                return Ok(FieldTest::Ops(ops));
            }
        }
    }
    Ok(FieldTest::Equals(value.clone()))
}

fn parse_op(op: &str, operand: &Value) -> Result<FieldOp> {
    match op {
        "$eq" => Ok(FieldOp::Eq(operand.clone())),
        "$ne" => Ok(FieldOp::Ne(operand.clone())),
        "$lt" => Ok(FieldOp::Lt(operand.clone())),
        "$lte" => Ok(FieldOp::Lte(operand.clone())),
        "$gt" => Ok(FieldOp::Gt(operand.clone())),
        "$gte" => Ok(FieldOp::Gte(operand.clone())),
        "$in" | "$nin" => {
            let items = operand
                .as_array()
                .ok_or_else(|| QuillError::InvalidQuery(format!("{} takes an array", op)))?
                .clone();
            Ok(if op == "$in" {
                FieldOp::In(items)
            } else {
                FieldOp::Nin(items)
            })
        }
        "$exists" => {
            let flag = operand
                .as_bool()
                .ok_or_else(|| QuillError::InvalidQuery("$exists takes a boolean".to_string()))?;
            Ok(FieldOp::Exists(flag))
        }
        "$regex" => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| QuillError::InvalidQuery("$regex takes a string".to_string()))?;
            Ok(FieldOp::Regex(get_or_compile_regex(pattern)?))
        }
        "$size" => {
            let size = operand
                .as_u64()
                .ok_or_else(|| {
                    QuillError::InvalidQuery("$size takes a non-negative integer".to_string())
                })?;
            Ok(FieldOp::Size(size as usize))
        }
        "$elemMatch" => {
            if !operand.is_object() {
                return Err(QuillError::InvalidQuery(
                    "$elemMatch takes a query object".to_string(),
                ));
            }
            Ok(FieldOp::ElemMatch(Query::parse(operand)?))
        }
        other => Err(QuillError::InvalidQuery(format!(
            "unknown query operator: {}",
            other
        ))),
    }
}

impl Clause {
    fn matches(&self, doc: &Value) -> bool {
        match self {
            Clause::Field { path, test } => {
                let resolved = get_path(doc, path);
                test.matches(resolved.as_ref())
            }
            Clause::And(queries) => queries.iter().all(|q| q.matches(doc)),
            Clause::Or(queries) => queries.iter().any(|q| q.matches(doc)),
            Clause::Nor(queries) => !queries.iter().any(|q| q.matches(doc)),
            Clause::Not(query) => !query.matches(doc),
        }
    }
}

impl FieldTest {
    fn matches(&self, resolved: Option<&Value>) -> bool {
        match self {
            FieldTest::Equals(expected) => match resolved {
                None => false,
                Some(Value::Array(items)) if !expected.is_array() => {
                    items.iter().any(|item| values_equal(item, expected))
                }
                Some(Value::Array(items)) => {
                    values_equal(resolved.unwrap(), expected)
                        || items.iter().any(|item| values_equal(item, expected))
                }
                Some(value) => values_equal(value, expected),
            },
            FieldTest::Ops(ops) => ops.iter().all(|op| op.matches(resolved)),
        }
    }
}

impl FieldOp {
    fn matches(&self, resolved: Option<&Value>) -> bool {
        match self {
            // Array-level operators apply to the array itself
            FieldOp::Size(expected) => match resolved {
                Some(Value::Array(items)) => items.len() == *expected,
                _ => false,
            },
            FieldOp::ElemMatch(query) => match resolved {
                Some(Value::Array(items)) => items.iter().any(|item| query.matches(item)),
                _ => false,
            },
            // $exists looks at the field, not its elements
            FieldOp::Exists(expected) => resolved.is_some() == *expected,
            // Everything else falls back to any-element matching on arrays
            _ => match resolved {
                Some(Value::Array(items)) => {
                    items.iter().any(|item| self.matches_scalar(Some(item)))
                }
                other => self.matches_scalar(other),
            },
        }
    }

    fn matches_scalar(&self, resolved: Option<&Value>) -> bool {
        match self {
            FieldOp::Eq(expected) => resolved.is_some_and(|v| values_equal(v, expected)),
            FieldOp::Ne(expected) => !resolved.is_some_and(|v| values_equal(v, expected)),
            FieldOp::Lt(bound) => compare_like(resolved, bound, |ord| ord == Ordering::Less),
            FieldOp::Lte(bound) => compare_like(resolved, bound, |ord| ord != Ordering::Greater),
            FieldOp::Gt(bound) => compare_like(resolved, bound, |ord| ord == Ordering::Greater),
            FieldOp::Gte(bound) => compare_like(resolved, bound, |ord| ord != Ordering::Less),
            FieldOp::In(allowed) => {
                resolved.is_some_and(|v| allowed.iter().any(|a| values_equal(v, a)))
            }
            FieldOp::Nin(denied) => {
                !resolved.is_some_and(|v| denied.iter().any(|a| values_equal(v, a)))
            }
            FieldOp::Regex(regex) => {
                resolved.and_then(Value::as_str).is_some_and(|s| regex.is_match(s))
            }
            // Handled in matches()
            FieldOp::Exists(_) | FieldOp::Size(_) | FieldOp::ElemMatch(_) => false,
        }
    }
}

/// Range operators only compare like kinds (number/number, string/string,
/// date/date); anything else never matches.
fn compare_like(
    resolved: Option<&Value>,
    bound: &Value,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    match resolved {
        Some(value) if comparable(value, bound) => {
            accept(compare_values(value, bound, StringCollation::Binary))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::date_value;
    use serde_json::json;

    fn matches(query: Value, doc: Value) -> bool {
        Query::parse(&query).unwrap().matches(&doc)
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(matches(json!({}), json!({"a": 1})));
    }

    #[test]
    fn test_simple_equality() {
        assert!(matches(json!({"name": "Alice"}), json!({"name": "Alice"})));
        assert!(!matches(json!({"name": "Alice"}), json!({"name": "Bob"})));
    }

    #[test]
    fn test_equality_on_missing_field_never_matches() {
        assert!(!matches(json!({"a": null}), json!({"b": 1})));
        assert!(!matches(json!({"a": 1}), json!({"b": 1})));
    }

    #[test]
    fn test_nested_dot_path_equality() {
        let doc = json!({"address": {"city": "Paris"}});
        assert!(matches(json!({"address.city": "Paris"}), doc.clone()));
        assert!(!matches(json!({"address.city": "Rome"}), doc));
    }

    #[test]
    fn test_array_element_fallback() {
        let doc = json!({"tags": ["red", "blue"]});
        assert!(matches(json!({"tags": "red"}), doc.clone()));
        assert!(!matches(json!({"tags": "green"}), doc.clone()));
        // Whole-array equality also matches
        assert!(matches(json!({"tags": ["red", "blue"]}), doc));
    }

    #[test]
    fn test_fan_out_through_nested_arrays() {
        let doc = json!({"posts": [{"author": "ann"}, {"author": "bob"}]});
        assert!(matches(json!({"posts.author": "bob"}), doc.clone()));
        assert!(!matches(json!({"posts.author": "eve"}), doc));
    }

    #[test]
    fn test_range_operators() {
        let doc = json!({"age": 25});
        assert!(matches(json!({"age": {"$gt": 18, "$lt": 30}}), doc.clone()));
        assert!(!matches(json!({"age": {"$gte": 26}}), doc.clone()));
        assert!(matches(json!({"age": {"$lte": 25}}), doc));
    }

    #[test]
    fn test_range_requires_like_kinds() {
        assert!(!matches(json!({"age": {"$lt": "30"}}), json!({"age": 25})));
        assert!(!matches(json!({"age": {"$gt": true}}), json!({"age": 25})));
    }

    #[test]
    fn test_date_range() {
        let doc = json!({"at": date_value(500)});
        assert!(matches(json!({"at": {"$gt": date_value(100)}}), doc.clone()));
        assert!(!matches(json!({"at": {"$gt": date_value(900)}}), doc));
    }

    #[test]
    fn test_in_and_nin() {
        let doc = json!({"city": "NYC"});
        assert!(matches(json!({"city": {"$in": ["NYC", "LA"]}}), doc.clone()));
        assert!(!matches(json!({"city": {"$in": ["SF"]}}), doc.clone()));
        assert!(!matches(json!({"city": {"$nin": ["NYC"]}}), doc));
        // $nin on a missing field matches
        assert!(matches(json!({"city": {"$nin": ["NYC"]}}), json!({"a": 1})));
    }

    #[test]
    fn test_ne_on_missing_field_matches() {
        assert!(matches(json!({"a": {"$ne": 5}}), json!({"b": 1})));
        assert!(!matches(json!({"a": {"$ne": 5}}), json!({"a": 5})));
    }

    #[test]
    fn test_exists() {
        assert!(matches(json!({"a": {"$exists": true}}), json!({"a": null})));
        assert!(matches(json!({"a": {"$exists": true}}), json!({"a": []})));
        assert!(!matches(json!({"a": {"$exists": true}}), json!({"b": 1})));
        assert!(matches(json!({"a": {"$exists": false}}), json!({"b": 1})));
    }

    #[test]
    fn test_regex() {
        let doc = json!({"name": "quillbase"});
        assert!(matches(json!({"name": {"$regex": "^quill"}}), doc.clone()));
        assert!(!matches(json!({"name": {"$regex": "base$"}}), json!({"name": "basement"})));
        // Non-strings never match
        assert!(!matches(json!({"n": {"$regex": "1"}}), json!({"n": 1})));
    }

    #[test]
    fn test_size() {
        let doc = json!({"tags": ["a", "b", "c"]});
        assert!(matches(json!({"tags": {"$size": 3}}), doc.clone()));
        assert!(!matches(json!({"tags": {"$size": 2}}), doc));
        assert!(!matches(json!({"n": {"$size": 0}}), json!({"n": 5})));
    }

    #[test]
    fn test_elem_match() {
        let doc = json!({"readings": [{"t": 10, "ok": true}, {"t": 50, "ok": false}]});
        assert!(matches(
            json!({"readings": {"$elemMatch": {"t": {"$gt": 40}, "ok": false}}}),
            doc.clone()
        ));
        assert!(!matches(
            json!({"readings": {"$elemMatch": {"t": {"$gt": 40}, "ok": true}}}),
            doc
        ));
    }

    #[test]
    fn test_logical_operators() {
        let doc = json!({"a": 5, "b": "x"});
        assert!(matches(json!({"$or": [{"a": 1}, {"b": "x"}]}), doc.clone()));
        assert!(matches(json!({"$and": [{"a": 5}, {"b": "x"}]}), doc.clone()));
        assert!(!matches(json!({"$nor": [{"a": 5}, {"b": "y"}]}), doc.clone()));
        assert!(matches(json!({"$nor": [{"a": 1}, {"b": "y"}]}), doc.clone()));
        assert!(matches(json!({"$not": {"a": 1}}), doc));
    }

    #[test]
    fn test_multiple_operators_all_must_hold() {
        let doc = json!({"n": 15});
        assert!(matches(json!({"n": {"$gt": 10, "$lt": 20, "$ne": 13}}), doc.clone()));
        assert!(!matches(json!({"n": {"$gt": 10, "$lt": 20, "$ne": 15}}), doc));
    }

    #[test]
    fn test_date_operand_is_not_an_operator_object() {
        let doc = json!({"at": date_value(777)});
        assert!(matches(json!({"at": date_value(777)}), doc.clone()));
        assert!(!matches(json!({"at": date_value(778)}), doc));
    }

    #[test]
    fn test_malformed_or_rejected() {
        assert!(matches_err(json!({"$or": {"a": 1}})));
        assert!(matches_err(json!({"$or": "nope"})));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        assert!(matches_err(json!({"a": {"$fancy": 1}})));
        assert!(matches_err(json!({"$xor": []})));
    }

    #[test]
    fn test_mixed_operator_and_plain_rejected() {
        assert!(matches_err(json!({"a": {"$gt": 1, "plain": 2}})));
    }

    #[test]
    fn test_bad_operand_shapes_rejected() {
        assert!(matches_err(json!({"a": {"$in": 5}})));
        assert!(matches_err(json!({"a": {"$exists": "yes"}})));
        assert!(matches_err(json!({"a": {"$size": -1}})));
        assert!(matches_err(json!({"a": {"$size": "big"}})));
        assert!(matches_err(json!({"a": {"$regex": "("}})));
        assert!(matches_err(json!({"a": {"$regex": 7}})));
        assert!(matches_err(json!({"$not": [1]})));
    }

    fn matches_err(query: Value) -> bool {
        matches!(Query::parse(&query), Err(QuillError::InvalidQuery(_)))
    }

    #[test]
    fn test_equality_against_plain_object() {
        let doc = json!({"meta": {"k": 1}});
        assert!(matches(json!({"meta": {"k": 1}}), doc.clone()));
        assert!(!matches(json!({"meta": {"k": 2}}), doc));
    }
}
