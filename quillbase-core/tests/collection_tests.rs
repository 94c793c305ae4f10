// End-to-end collection behavior over the real file backend
use quillbase_core::{
    Collection, CollectionOptions, DbEvent, IndexOptions, QuillError, RemoveOptions,
    UpdateOptions,
};
use serde_json::json;
use std::collections::HashMap;
use tempfile::TempDir;

fn datafile(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

fn open(dir: &TempDir, name: &str) -> Collection {
    Collection::new(CollectionOptions::new(datafile(dir, name))).unwrap()
}

#[test]
fn test_insert_two_docs_and_find_all() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "basic.db");

    collection.insert(json!({"a": 1})).unwrap();
    collection.insert(json!({"a": 2})).unwrap();

    let docs = collection.find(json!({})).exec().unwrap();
    assert_eq!(docs.len(), 2);
    for doc in &docs {
        assert_eq!(doc["_id"].as_str().unwrap().len(), 16);
        let a = doc["a"].as_i64().unwrap();
        assert!(a == 1 || a == 2);
    }
}

#[test]
fn test_unique_index_scenario() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "unique.db");

    collection
        .ensure_index(IndexOptions::new("a").with_unique(true))
        .unwrap();
    collection.insert(json!({"a": 1})).unwrap();
    let err = collection.insert(json!({"a": 1})).unwrap_err();
    assert!(matches!(err, QuillError::UniqueViolated { .. }));
    assert_eq!(collection.find(json!({})).exec().unwrap().len(), 1);
}

#[test]
fn test_find_one_and_count() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "findone.db");

    for i in 0..5 {
        collection.insert(json!({"n": i, "even": i % 2 == 0})).unwrap();
    }
    assert_eq!(collection.count(json!({"even": true})).unwrap(), 3);
    let doc = collection.find_one(json!({"n": 3})).unwrap().unwrap();
    assert_eq!(doc["even"], json!(false));
    assert!(collection.find_one(json!({"n": 99})).unwrap().is_none());
}

#[test]
fn test_sort_skip_limit_projection_pipeline() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "pipeline.db");

    for i in 0..10 {
        collection.insert(json!({"n": i})).unwrap();
    }
    let docs = collection
        .find(json!({}))
        .sort(vec![("n".to_string(), 1)])
        .skip(4)
        .limit(2)
        .projection(HashMap::from([("n".to_string(), 1), ("_id".to_string(), 0)]))
        .exec()
        .unwrap();
    assert_eq!(docs, vec![json!({"n": 4}), json!({"n": 5})]);
}

#[test]
fn test_update_multi_and_returned_docs() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "update.db");

    for i in 0..3 {
        collection.insert(json!({"_id": i, "n": i})).unwrap();
    }
    let result = collection
        .update(
            json!({"n": {"$lt": 2}}),
            json!({"$inc": {"n": 100}}),
            UpdateOptions::new()
                .with_multi(true)
                .with_return_updated_docs(true),
        )
        .unwrap();
    assert!(result.acknowledged);
    assert_eq!(result.modified_count, 2);
    let docs = result.updated_docs.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d["n"].as_i64().unwrap() >= 100));
}

#[test]
fn test_multi_index_rollback_scenario() {
    // Unique indexes on a, b and c; the $set on b collides with doc 3, so
    // the whole update must leave every document untouched.
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "rollback.db");

    for field in ["a", "b"] {
        collection
            .ensure_index(IndexOptions::new(field).with_unique(true))
            .unwrap();
    }
    // No document carries "c" yet; unique + sparse keeps the missing field
    // off the undefined sentinel
    collection
        .ensure_index(IndexOptions::new("c").with_unique(true).with_sparse(true))
        .unwrap();
    collection.insert(json!({"_id": 1, "a": 1, "b": 10})).unwrap();
    collection.insert(json!({"_id": 2, "a": 2, "b": 20})).unwrap();
    collection.insert(json!({"_id": 3, "a": 3, "b": 30})).unwrap();

    let err = collection
        .update(
            json!({"a": 2}),
            json!({"$inc": {"a": 10, "c": 1000}, "$set": {"b": 30}}),
            UpdateOptions::new(),
        )
        .unwrap_err();
    assert!(matches!(err, QuillError::UniqueViolated { .. }));

    let docs = collection
        .find(json!({}))
        .sort(vec![("a".to_string(), 1)])
        .exec()
        .unwrap();
    assert_eq!(docs[0], json!({"_id": 1, "a": 1, "b": 10}));
    assert_eq!(docs[1], json!({"_id": 2, "a": 2, "b": 20}));
    assert_eq!(docs[2], json!({"_id": 3, "a": 3, "b": 30}));

    // Index lookups agree with the documents
    assert_eq!(collection.count(json!({"a": 2})).unwrap(), 1);
    assert_eq!(collection.count(json!({"a": 12})).unwrap(), 0);
    assert_eq!(collection.count(json!({"c": {"$exists": true}})).unwrap(), 0);
}

#[test]
fn test_upsert_scenario() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "upsert.db");

    let result = collection
        .update(
            json!({"$or": [{"a": 4}, {"a": 5}], "cac": "rrr"}),
            json!({"$set": {"hello": "world"}, "$inc": {"bloup": 3}}),
            UpdateOptions::new().with_upsert(true),
        )
        .unwrap();
    assert!(result.upsert);

    let docs = collection.find(json!({})).exec().unwrap();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc["cac"], json!("rrr"));
    assert_eq!(doc["hello"], json!("world"));
    assert_eq!(doc["bloup"], json!(3));
    assert_eq!(doc["_id"].as_str().unwrap().len(), 16);
}

#[test]
fn test_remove_returns_count() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "remove.db");

    for i in 0..5 {
        collection.insert(json!({"n": i})).unwrap();
    }
    let removed = collection
        .remove(json!({"n": {"$gte": 3}}), RemoveOptions::new().with_multi(true))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(collection.count(json!({})).unwrap(), 3);
}

#[test]
fn test_malformed_queries_and_projections_surface_errors() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "errors.db");
    collection.insert(json!({"a": 1, "b": 2})).unwrap();

    let err = collection.find(json!({"$or": 5})).exec().unwrap_err();
    assert!(matches!(err, QuillError::InvalidQuery(_)));

    let err = collection
        .find(json!({}))
        .projection(HashMap::from([("a".to_string(), 1), ("b".to_string(), 0)]))
        .exec()
        .unwrap_err();
    assert!(matches!(err, QuillError::InvalidProjection(_)));

    let err = collection
        .update(json!({}), json!({"$set": {"a": 1}, "plain": 2}), UpdateOptions::new())
        .unwrap_err();
    assert!(matches!(err, QuillError::InvalidModifier(_)));
}

#[test]
fn test_events_over_a_mutation_sequence() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "events.db");
    let rx = collection.subscribe();

    collection.insert(json!({"_id": 1, "a": 1})).unwrap();
    collection
        .update(json!({"_id": 1}), json!({"$inc": {"a": 1}}), UpdateOptions::new())
        .unwrap();
    collection.remove(json!({"_id": 1}), RemoveOptions::new()).unwrap();
    collection.compact_datafile().unwrap();

    let events: Vec<DbEvent> = rx.try_iter().collect();
    let updated = events.iter().filter(|e| **e == DbEvent::Updated).count();
    assert_eq!(updated, 3);
    assert!(events.contains(&DbEvent::Compacted));
}

#[test]
fn test_dotted_keys_rejected_at_insertion() {
    let dir = TempDir::new().unwrap();
    let collection = open(&dir, "dots.db");
    let err = collection.insert(json!({"a.b": 1})).unwrap_err();
    assert!(matches!(err, QuillError::InvalidFieldName(_)));
    let err = collection.insert(json!({"$top": 1})).unwrap_err();
    assert!(matches!(err, QuillError::InvalidFieldName(_)));
}

#[test]
fn test_datafile_name_ending_in_tilde_rejected() {
    let dir = TempDir::new().unwrap();
    let result = Collection::new(CollectionOptions::new(datafile(&dir, "bad.db~")));
    assert!(matches!(result, Err(QuillError::InvalidDatafileName(_))));
}
