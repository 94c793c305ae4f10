// quillbase-core/src/persistence.rs
//! Append-only NDJSON log: codec, replay and compaction
//!
//! One record per line:
//! - a document (must carry `_id`)
//! - a tombstone: `{"_id": ..., "$$deleted": true}`
//! - `{"$$indexCreated": {"fieldName": ..., ...}}`
//! - `{"$$indexRemoved": "<field>"}`
//!
//! Replay is last-writer-wins per `_id`. Lines that fail to decode are
//! counted; when the corrupt ratio exceeds the alert threshold the database
//! refuses to open, which protects a datafile from being loaded (and later
//! compacted away) with the wrong serialization hooks.

use crate::error::{QuillError, Result};
use crate::index::IndexOptions;
use crate::storage::Storage;
use ahash::AHashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

/// Marker key of tombstone records.
pub const DELETED_KEY: &str = "$$deleted";
/// Marker key of index-creation records.
pub const INDEX_CREATED_KEY: &str = "$$indexCreated";
/// Marker key of index-removal records.
pub const INDEX_REMOVED_KEY: &str = "$$indexRemoved";

/// Default ceiling on the corrupt-line ratio tolerated during replay.
pub const DEFAULT_CORRUPT_ALERT_THRESHOLD: f64 = 0.1;

/// Optional line transformer applied after serialization / before
/// deserialization (e.g. encryption). Must be supplied as an inverse pair.
pub type SerializationHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Result of replaying a raw datafile.
pub struct LoadedState {
    pub docs: Vec<Value>,
    pub indexes: Vec<IndexOptions>,
    pub corrupt_lines: usize,
    pub total_lines: usize,
}

/// Owns the datafile: every mutation appends here, compaction rewrites here.
pub struct Persistence {
    storage: Box<dyn Storage>,
    filename: String,
    in_memory_only: bool,
    corrupt_alert_threshold: f64,
    after_serialization: Option<SerializationHook>,
    before_deserialization: Option<SerializationHook>,
}

impl Persistence {
    /// Build the persistence handle, validating the datafile name and the
    /// hook pair (both or neither; must round-trip random strings).
    pub fn new(
        storage: Box<dyn Storage>,
        filename: String,
        in_memory_only: bool,
        corrupt_alert_threshold: f64,
        after_serialization: Option<SerializationHook>,
        before_deserialization: Option<SerializationHook>,
    ) -> Result<Persistence> {
        if filename.ends_with('~') {
            return Err(QuillError::InvalidDatafileName(format!(
                "datafile names cannot end with '~': {}",
                filename
            )));
        }
        match (&after_serialization, &before_deserialization) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(QuillError::HookMisconfigured(
                    "afterSerialization and beforeDeserialization must be supplied together"
                        .to_string(),
                ));
            }
            _ => {}
        }

        let persistence = Persistence {
            storage,
            filename,
            in_memory_only,
            corrupt_alert_threshold,
            after_serialization,
            before_deserialization,
        };
        persistence.check_hooks_roundtrip()?;
        Ok(persistence)
    }

    /// Round-trip a battery of random strings through the hooks; a hook pair
    /// that is not an inverse would silently corrupt the datafile.
    fn check_hooks_roundtrip(&self) -> Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let len = rng.gen_range(1..=120);
            let sample: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect();
            let encoded = self.encode_line(&sample);
            let decoded = self.decode_line(&encoded);
            if decoded != sample {
                return Err(QuillError::HookMisconfigured(
                    "afterSerialization and beforeDeserialization are not inverses".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn in_memory_only(&self) -> bool {
        self.in_memory_only
    }

    fn encode_line(&self, line: &str) -> String {
        match &self.after_serialization {
            Some(hook) => hook(line),
            None => line.to_string(),
        }
    }

    fn decode_line(&self, line: &str) -> String {
        match &self.before_deserialization {
            Some(hook) => hook(line),
            None => line.to_string(),
        }
    }

    /// One serialized log line (hook applied, no trailing newline).
    fn serialize_record(&self, record: &Value) -> Result<String> {
        let line = serde_json::to_string(record)?;
        Ok(self.encode_line(&line))
    }

    /// Tombstone record for a document id.
    pub fn tombstone(id: &Value) -> Value {
        serde_json::json!({ "_id": id, DELETED_KEY: true })
    }

    /// `$$indexCreated` record for an index definition.
    pub fn index_created_record(options: &IndexOptions) -> Value {
        serde_json::json!({ INDEX_CREATED_KEY: options })
    }

    /// `$$indexRemoved` record for a field name.
    pub fn index_removed_record(field_name: &str) -> Value {
        serde_json::json!({ INDEX_REMOVED_KEY: field_name })
    }

    /// Read the datafile (running the storage integrity check) and replay it.
    pub fn load(&mut self) -> Result<LoadedState> {
        let raw = self.storage.read(&self.filename)?;
        let text = String::from_utf8_lossy(&raw);
        self.treat_raw_data(&text)
    }

    /// Replay raw datafile contents: last-writer-wins per `_id`, index
    /// records folded into an options set, corrupt lines counted against the
    /// alert threshold.
    pub fn treat_raw_data(&self, raw: &str) -> Result<LoadedState> {
        let mut lines: Vec<&str> = raw.split('\n').collect();
        // A trailing newline produces one empty trailing entry; tolerated
        if lines.last() == Some(&"") {
            lines.pop();
        }

        let mut docs_by_id: AHashMap<String, Value> = AHashMap::new();
        let mut indexes: AHashMap<String, IndexOptions> = AHashMap::new();
        let mut corrupt = 0usize;
        let total = lines.len();

        for line in lines {
            let decoded = self.decode_line(line);
            let record: Value = match serde_json::from_str(&decoded) {
                Ok(value) => value,
                Err(_) => {
                    corrupt += 1;
                    continue;
                }
            };
            match self.fold_record(record, &mut docs_by_id, &mut indexes) {
                Ok(()) => {}
                Err(_) => corrupt += 1,
            }
        }

        if total > 0 && corrupt as f64 / total as f64 > self.corrupt_alert_threshold {
            return Err(QuillError::CorruptionThreshold { corrupt, total });
        }

        let mut index_list: Vec<IndexOptions> =
            indexes.into_iter().map(|(_, options)| options).collect();
        index_list.sort_by(|a, b| a.field_name.cmp(&b.field_name));
        Ok(LoadedState {
            docs: docs_by_id.into_iter().map(|(_, doc)| doc).collect(),
            indexes: index_list,
            corrupt_lines: corrupt,
            total_lines: total,
        })
    }

    fn fold_record(
        &self,
        record: Value,
        docs_by_id: &mut AHashMap<String, Value>,
        indexes: &mut AHashMap<String, IndexOptions>,
    ) -> Result<()> {
        let map = record
            .as_object()
            .ok_or_else(|| QuillError::Serialization("record is not an object".to_string()))?;

        if let Some(created) = map.get(INDEX_CREATED_KEY) {
            let options: IndexOptions = serde_json::from_value(created.clone())?;
            indexes.insert(options.field_name.clone(), options);
            return Ok(());
        }
        if let Some(removed) = map.get(INDEX_REMOVED_KEY) {
            let field = removed
                .as_str()
                .ok_or_else(|| QuillError::Serialization("$$indexRemoved is not a string".to_string()))?;
            indexes.remove(field);
            return Ok(());
        }

        let id = map
            .get("_id")
            .ok_or_else(|| QuillError::Serialization("document record without _id".to_string()))?;
        let id_key = serde_json::to_string(id)?;
        if map.get(DELETED_KEY).and_then(Value::as_bool).unwrap_or(false) {
            docs_by_id.remove(&id_key);
        } else {
            docs_by_id.insert(id_key, record);
        }
        Ok(())
    }

    /// Append one line per record: changed documents, tombstones or index
    /// journal entries. In-memory collections skip the datafile entirely.
    pub fn persist_new_state<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a Value>,
    ) -> Result<()> {
        if self.in_memory_only {
            return Ok(());
        }
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&self.serialize_record(record)?);
            buffer.push('\n');
        }
        if buffer.is_empty() {
            return Ok(());
        }
        self.storage.append(&self.filename, buffer.as_bytes())
    }

    /// Atomically rewrite the datafile from the live cache: every document
    /// plus an `$$indexCreated` line per secondary index.
    pub fn persist_cached_database<'a>(
        &mut self,
        docs: impl IntoIterator<Item = &'a Value>,
        indexes: impl IntoIterator<Item = &'a IndexOptions>,
    ) -> Result<()> {
        if self.in_memory_only {
            return Ok(());
        }
        let mut buffer = String::new();
        for doc in docs {
            buffer.push_str(&self.serialize_record(doc)?);
            buffer.push('\n');
        }
        for options in indexes {
            let record = Self::index_created_record(options);
            buffer.push_str(&self.serialize_record(&record)?);
            buffer.push('\n');
        }
        self.storage.write(&self.filename, buffer.as_bytes())
    }
}
