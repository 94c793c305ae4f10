// quillbase-core/src/lib.rs
// Embedded, schemaless document store: Mongo-style queries, secondary
// indexes with unique/sparse/TTL semantics, an append-only NDJSON datafile
// with atomic compaction, and all-or-nothing multi-document mutations.

#![cfg_attr(test, allow(dead_code))]

pub mod collection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod events;
pub mod index;
pub mod logging;
pub mod persistence;
pub mod query;
pub mod storage;
pub mod update;
pub mod value_utils;

// Public exports
pub use collection::{
    Collection, CollectionOptions, Hooks, InsertHook, NotifyHook, RemoveHook, RemoveOptions,
    UpdateHook, UpdateOptions, UpdateResult, MIN_COMPACTION_INTERVAL_MS,
};
pub use cursor::Cursor;
pub use document::{date_now, date_value, DocId, DOC_ID_LEN};
pub use error::{QuillError, Result};
pub use events::DbEvent;
pub use index::{IndexKey, IndexOptions};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use persistence::{Persistence, SerializationHook, DEFAULT_CORRUPT_ALERT_THRESHOLD};
pub use query::Query;
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use update::UpdateSpec;
pub use value_utils::StringCollation;
