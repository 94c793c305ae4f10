// quillbase-core/src/collection.rs
//! The public collection API
//!
//! A collection owns the document arena, the index set (always including the
//! unique `_id` index), the TTL table, the persistence handle, the hook set
//! and the event bus. All state sits behind one `RwLock`; reads take the
//! write lock too because candidate selection reaps expired documents.
//!
//! Multi-document mutations are all-or-nothing: a constraint failure in any
//! index rolls every index back to its pre-operation state before the error
//! propagates.

use crate::cursor::Cursor;
use crate::document::{
    check_object, date_millis, date_now, generate_doc_id, is_date, now_millis, DocId,
};
use crate::error::{QuillError, Result};
use crate::events::{DbEvent, EventBus};
use crate::index::{Index, IndexKey, IndexOptions, KeyBounds};
use crate::persistence::{Persistence, SerializationHook, DEFAULT_CORRUPT_ALERT_THRESHOLD};
use crate::query::{Clause, FieldOp, FieldTest, Query};
use crate::storage::{FileStorage, MemoryStorage, Storage};
use crate::update::{set_path, UpdateSpec};
use crate::value_utils::{get_path, StringCollation};
use crate::quill_log;
use ahash::AHashMap;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Floor for the autocompaction interval.
pub const MIN_COMPACTION_INTERVAL_MS: u64 = 5000;

// ============================================================================
// OPTIONS & HOOKS
// ============================================================================

/// Transform a document before insertion.
pub type InsertHook = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;
/// Transform `(old, candidate_new) -> new` before an update is applied.
pub type UpdateHook = Arc<dyn Fn(&Value, Value) -> Result<Value> + Send + Sync>;
/// Inspect (and possibly veto) a document about to be removed.
pub type RemoveHook = Arc<dyn Fn(&Value) -> Result<()> + Send + Sync>;
/// Observe a document after a lifecycle step.
pub type NotifyHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// Optional lifecycle transformers; every stage defaults to identity.
#[derive(Default, Clone)]
pub struct Hooks {
    pub before_insert: Option<InsertHook>,
    pub after_insert: Option<NotifyHook>,
    pub before_update: Option<UpdateHook>,
    pub after_update: Option<NotifyHook>,
    pub before_remove: Option<RemoveHook>,
    pub after_remove: Option<NotifyHook>,
}

/// Collection construction options.
pub struct CollectionOptions {
    filename: String,
    name: Option<String>,
    storage: Option<Box<dyn Storage>>,
    in_memory_only: bool,
    timestamps: bool,
    autoload: bool,
    corruption_alert_threshold: f64,
    compaction_interval_ms: Option<u64>,
    collation: StringCollation,
    hooks: Hooks,
    after_serialization: Option<SerializationHook>,
    before_deserialization: Option<SerializationHook>,
}

impl CollectionOptions {
    pub fn new(filename: impl Into<String>) -> Self {
        CollectionOptions {
            filename: filename.into(),
            name: None,
            storage: None,
            in_memory_only: false,
            timestamps: false,
            autoload: true,
            corruption_alert_threshold: DEFAULT_CORRUPT_ALERT_THRESHOLD,
            compaction_interval_ms: None,
            collation: StringCollation::Binary,
            hooks: Hooks::default(),
            after_serialization: None,
            before_deserialization: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_storage(mut self, storage: Box<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Keep everything in memory; the datafile is never touched.
    pub fn in_memory_only(mut self) -> Self {
        self.in_memory_only = true;
        self
    }

    /// Maintain `createdAt`/`updatedAt` on every document.
    pub fn with_timestamps(mut self, timestamps: bool) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn with_autoload(mut self, autoload: bool) -> Self {
        self.autoload = autoload;
        self
    }

    pub fn with_corruption_alert_threshold(mut self, threshold: f64) -> Self {
        self.corruption_alert_threshold = threshold;
        self
    }

    /// Enable the autocompaction timer (floored at 5000 ms).
    pub fn with_compaction_interval_ms(mut self, interval_ms: u64) -> Self {
        self.compaction_interval_ms = Some(interval_ms);
        self
    }

    pub fn with_collation(mut self, collation: StringCollation) -> Self {
        self.collation = collation;
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Paired line transformers for the datafile (e.g. encryption). Both or
    /// neither must be given; the pair is self-checked at construction.
    pub fn with_serialization_hooks(
        mut self,
        after_serialization: SerializationHook,
        before_deserialization: SerializationHook,
    ) -> Self {
        self.after_serialization = Some(after_serialization);
        self.before_deserialization = Some(before_deserialization);
        self
    }
}

/// Options for `update`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub multi: bool,
    pub upsert: bool,
    pub return_updated_docs: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        UpdateOptions::default()
    }

    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn with_return_updated_docs(mut self, yes: bool) -> Self {
        self.return_updated_docs = yes;
        self
    }
}

/// Options for `remove`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveOptions {
    pub multi: bool,
}

impl RemoveOptions {
    pub fn new() -> Self {
        RemoveOptions::default()
    }

    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }
}

/// Result of an `update` call.
#[derive(Debug, Clone, Default)]
pub struct UpdateResult {
    pub acknowledged: bool,
    pub modified_count: usize,
    pub upsert: bool,
    pub inserted_ids: Vec<Value>,
    pub inserted_docs: Option<Vec<Value>>,
    pub updated_docs: Option<Vec<Value>>,
}

// ============================================================================
// COLLECTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadState {
    Loading,
    Ready,
    Errored(String),
}

struct Autocompactor {
    stop_tx: Sender<()>,
    _handle: JoinHandle<()>,
}

/// An embedded, schemaless document collection backed by one datafile.
pub struct Collection {
    inner: Arc<RwLock<CollectionInner>>,
    autocompactor: Mutex<Option<Autocompactor>>,
}

struct CollectionInner {
    name: String,
    /// Arena owning every live document; indexes hold `DocId` handles only.
    docs: AHashMap<DocId, Value>,
    next_doc_id: u64,
    /// Indexes keyed by field name; `_id` is always present and unique.
    indexes: HashMap<String, Index>,
    /// TTL table: field name → expireAfterSeconds.
    ttl: HashMap<String, f64>,
    persistence: Persistence,
    hooks: Hooks,
    timestamps: bool,
    collation: StringCollation,
    events: EventBus,
    state: LoadState,
}

impl Collection {
    /// Build a collection. With `autoload` (the default) the datafile is
    /// read, replayed and compacted before this returns; a replay failure
    /// (e.g. the corruption threshold) fails construction.
    pub fn new(options: CollectionOptions) -> Result<Collection> {
        let CollectionOptions {
            filename,
            name,
            storage,
            in_memory_only,
            timestamps,
            autoload,
            corruption_alert_threshold,
            compaction_interval_ms,
            collation,
            hooks,
            after_serialization,
            before_deserialization,
        } = options;

        let storage: Box<dyn Storage> = match storage {
            Some(storage) => storage,
            None if in_memory_only => Box::new(MemoryStorage::new()),
            None => Box::new(FileStorage::new()),
        };
        let persistence = Persistence::new(
            storage,
            filename.clone(),
            in_memory_only,
            corruption_alert_threshold,
            after_serialization,
            before_deserialization,
        )?;

        let mut indexes = HashMap::new();
        indexes.insert(
            "_id".to_string(),
            Index::new(IndexOptions::new("_id").with_unique(true), collation),
        );

        let inner = CollectionInner {
            name: name.unwrap_or_else(|| filename.clone()),
            docs: AHashMap::new(),
            next_doc_id: 0,
            indexes,
            ttl: HashMap::new(),
            persistence,
            hooks,
            timestamps,
            collation,
            events: EventBus::new(),
            state: LoadState::Loading,
        };

        let collection = Collection {
            inner: Arc::new(RwLock::new(inner)),
            autocompactor: Mutex::new(None),
        };
        if autoload {
            collection.load_database()?;
        }
        if let Some(interval) = compaction_interval_ms {
            collection.set_autocompaction_interval(interval);
        }
        Ok(collection)
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    /// Subscribe to lifecycle events. Delivery is asynchronous via an
    /// unbounded channel.
    pub fn subscribe(&self) -> Receiver<DbEvent> {
        self.inner.write().events.subscribe()
    }

    pub(crate) fn collation(&self) -> StringCollation {
        self.inner.read().collation
    }

    /// Read the datafile, rebuild every index and compact. Emits `READY` on
    /// completion (plus `ERROR` on failure).
    pub fn load_database(&self) -> Result<()> {
        let mut inner = self.inner.write();
        let result = inner.load_internal();
        match &result {
            Ok(()) => {
                inner.state = LoadState::Ready;
                quill_log!(Info, "collection '{}' loaded ({} docs)", inner.name, inner.docs.len());
            }
            Err(err) => {
                inner.state = LoadState::Errored(err.to_string());
                let message = err.to_string();
                inner.events.emit(DbEvent::Error(message));
            }
        }
        inner.events.emit(DbEvent::Ready);
        result
    }

    /// The synchronous rendition of "calls queue until READY": a call made
    /// before the first load performs the load; after a failed load every
    /// call fails with the stored error.
    fn ensure_loaded(&self) -> Result<()> {
        {
            let inner = self.inner.read();
            match &inner.state {
                LoadState::Ready => return Ok(()),
                LoadState::Errored(message) => {
                    return Err(QuillError::LoadFailed(message.clone()))
                }
                LoadState::Loading => {}
            }
        }
        self.load_database()
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Insert one document; returns a deep copy of the stored form (with the
    /// assigned `_id` and, when enabled, timestamps).
    pub fn insert(&self, doc: Value) -> Result<Value> {
        let mut docs = self.insert_many(vec![doc])?;
        Ok(docs.pop().expect("insert_many returned one document"))
    }

    /// Insert several documents atomically: a constraint failure on any of
    /// them removes the ones already indexed.
    pub fn insert_many(&self, docs: Vec<Value>) -> Result<Vec<Value>> {
        self.ensure_loaded()?;
        let mut inner = self.inner.write();
        let inserted = inner.insert_docs(docs)?;
        inner.events.emit(DbEvent::Updated);
        Ok(inserted)
    }

    /// Start a query; chain `limit`/`skip`/`sort`/`projection`, then `exec`.
    pub fn find(&self, query: Value) -> Cursor<'_> {
        Cursor::new(self, query)
    }

    /// First matching document, if any.
    pub fn find_one(&self, query: Value) -> Result<Option<Value>> {
        let mut docs = self.find(query).limit(1).exec()?;
        Ok(docs.pop())
    }

    /// Number of matching documents.
    pub fn count(&self, query: Value) -> Result<usize> {
        let query = Query::parse(&query)?;
        Ok(self.collect_matching(&query, None)?.len())
    }

    /// Deep copies of every live document.
    pub fn get_all_data(&self) -> Result<Vec<Value>> {
        self.ensure_loaded()?;
        let inner = self.inner.read();
        Ok(inner.docs.values().cloned().collect())
    }

    /// Update matching documents (or upsert). All index mutations across all
    /// matched documents are applied atomically.
    pub fn update(&self, query: Value, update: Value, options: UpdateOptions) -> Result<UpdateResult> {
        self.ensure_loaded()?;
        let parsed = Query::parse(&query)?;
        let spec = UpdateSpec::parse(&update)?;
        let mut inner = self.inner.write();

        let candidates = inner.get_candidates(&parsed, false);
        let mut pairs: Vec<(DocId, Value, Value)> = Vec::new();
        for id in candidates {
            let old = match inner.docs.get(&id) {
                Some(doc) => doc.clone(),
                None => continue,
            };
            if !parsed.matches(&old) {
                continue;
            }
            let mut new = spec.apply(&old)?;
            if let Some(hook) = inner.hooks.before_update.clone() {
                new = hook(&old, new)?;
            }
            if inner.timestamps {
                if let Some(created) = old.as_object().and_then(|m| m.get("createdAt")) {
                    set_path(&mut new, "createdAt", created.clone());
                }
                set_path(&mut new, "updatedAt", date_now());
            }
            pairs.push((id, old, new));
            if !options.multi {
                break;
            }
        }

        if pairs.is_empty() {
            if options.upsert {
                return inner.upsert(&parsed, &spec, &update);
            }
            return Ok(UpdateResult {
                acknowledged: true,
                ..Default::default()
            });
        }

        inner.apply_update_pairs(&pairs)?;
        inner
            .persistence
            .persist_new_state(pairs.iter().map(|(_, _, new)| new))?;
        if let Some(hook) = inner.hooks.after_update.clone() {
            for (_, _, new) in &pairs {
                hook(new);
            }
        }
        inner.events.emit(DbEvent::Updated);

        Ok(UpdateResult {
            acknowledged: true,
            modified_count: pairs.len(),
            upsert: false,
            inserted_ids: Vec::new(),
            inserted_docs: None,
            updated_docs: options
                .return_updated_docs
                .then(|| pairs.into_iter().map(|(_, _, new)| new).collect()),
        })
    }

    /// Remove matching documents; returns how many were removed. Stale TTL
    /// documents are NOT reaped first, so an explicit remove can still see
    /// them.
    pub fn remove(&self, query: Value, options: RemoveOptions) -> Result<usize> {
        self.ensure_loaded()?;
        let parsed = Query::parse(&query)?;
        let mut inner = self.inner.write();

        let candidates = inner.get_candidates(&parsed, true);
        let mut removed: Vec<Value> = Vec::new();
        for id in candidates {
            let doc = match inner.docs.get(&id) {
                Some(doc) => doc.clone(),
                None => continue,
            };
            if !parsed.matches(&doc) {
                continue;
            }
            if let Some(hook) = inner.hooks.before_remove.clone() {
                hook(&doc)?;
            }
            inner.remove_document(id, &doc);
            removed.push(doc);
            if !options.multi {
                break;
            }
        }

        let tombstones: Vec<Value> = removed
            .iter()
            .filter_map(|doc| doc.as_object().and_then(|m| m.get("_id")))
            .map(Persistence::tombstone)
            .collect();
        inner.persistence.persist_new_state(tombstones.iter())?;
        if let Some(hook) = inner.hooks.after_remove.clone() {
            for doc in &removed {
                hook(doc);
            }
        }
        if !removed.is_empty() {
            inner.events.emit(DbEvent::Updated);
        }
        Ok(removed.len())
    }

    // ========================================================================
    // INDEX MANAGEMENT
    // ========================================================================

    /// Create an index (no-op when one already exists on the field),
    /// populate it from the live documents and journal the creation.
    pub fn ensure_index(&self, options: IndexOptions) -> Result<()> {
        self.ensure_loaded()?;
        let mut inner = self.inner.write();
        if !inner.build_index(&options)? {
            return Ok(());
        }
        let record = Persistence::index_created_record(&options);
        inner.persistence.persist_new_state([&record])
    }

    /// Drop an index and journal the removal.
    pub fn remove_index(&self, field_name: &str) -> Result<()> {
        if field_name == "_id" {
            return Err(QuillError::InvalidFieldName(
                "the _id index cannot be removed".to_string(),
            ));
        }
        self.ensure_loaded()?;
        let mut inner = self.inner.write();
        inner.indexes.remove(field_name);
        inner.ttl.remove(field_name);
        let record = Persistence::index_removed_record(field_name);
        inner.persistence.persist_new_state([&record])
    }

    /// Fields carrying an index, `_id` included.
    pub fn list_indexes(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut fields: Vec<String> = inner.indexes.keys().cloned().collect();
        fields.sort();
        fields
    }

    // ========================================================================
    // COMPACTION
    // ========================================================================

    /// Rewrite the datafile to exactly the live state (atomic rename).
    pub fn compact_datafile(&self) -> Result<()> {
        self.ensure_loaded()?;
        self.inner.write().compact_internal()
    }

    /// Start (or restart) the autocompaction timer. Intervals below 5000 ms
    /// are raised to the floor. Compaction errors emit `ERROR` and the timer
    /// keeps running.
    pub fn set_autocompaction_interval(&self, interval_ms: u64) {
        let interval = interval_ms.max(MIN_COMPACTION_INTERVAL_MS);
        self.stop_autocompaction();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let weak: Weak<RwLock<CollectionInner>> = Arc::downgrade(&self.inner);
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(Duration::from_millis(interval)) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    let inner = match weak.upgrade() {
                        Some(inner) => inner,
                        None => break,
                    };
                    let mut inner = inner.write();
                    if let Err(err) = inner.compact_internal() {
                        quill_log!(Error, "autocompaction failed: {}", err);
                        let message = err.to_string();
                        inner.events.emit(DbEvent::Error(message));
                    }
                }
            }
        });
        *self.autocompactor.lock() = Some(Autocompactor {
            stop_tx,
            _handle: handle,
        });
    }

    /// Stop the autocompaction timer, if running.
    pub fn stop_autocompaction(&self) {
        if let Some(autocompactor) = self.autocompactor.lock().take() {
            let _ = autocompactor.stop_tx.try_send(());
        }
    }

    // ========================================================================
    // QUERY SUPPORT (used by Cursor)
    // ========================================================================

    /// Walk the candidate set, reap stale TTL documents, and deep-copy every
    /// match; `stop_after` bounds the walk when no sort is requested.
    pub(crate) fn collect_matching(
        &self,
        query: &Query,
        stop_after: Option<usize>,
    ) -> Result<Vec<Value>> {
        self.ensure_loaded()?;
        let mut inner = self.inner.write();
        let candidates = inner.get_candidates(query, false);
        let mut matched = Vec::new();
        for id in candidates {
            if let Some(doc) = inner.docs.get(&id) {
                if query.matches(doc) {
                    matched.push(doc.clone());
                    if stop_after.is_some_and(|n| matched.len() >= n) {
                        break;
                    }
                }
            }
        }
        Ok(matched)
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        self.stop_autocompaction();
    }
}

// ============================================================================
// INTERNALS
// ============================================================================

impl CollectionInner {
    fn alloc_id(&mut self) -> DocId {
        self.next_doc_id += 1;
        DocId::new(self.next_doc_id)
    }

    fn index_fields(&self) -> Vec<String> {
        self.indexes.keys().cloned().collect()
    }

    /// Clear index data and the arena; index definitions survive.
    fn reset_indexes(&mut self) {
        for index in self.indexes.values_mut() {
            index.clear();
        }
        self.docs.clear();
    }

    fn load_internal(&mut self) -> Result<()> {
        self.reset_indexes();
        if self.persistence.in_memory_only() {
            return Ok(());
        }

        let state = self.persistence.load()?;
        for options in &state.indexes {
            if !self.indexes.contains_key(&options.field_name) {
                self.indexes.insert(
                    options.field_name.clone(),
                    Index::new(options.clone(), self.collation),
                );
            }
            if let Some(seconds) = options.expire_after_seconds {
                self.ttl.insert(options.field_name.clone(), seconds);
            }
        }

        let fields = self.index_fields();
        for doc in &state.docs {
            let id = self.alloc_id();
            for field in &fields {
                let index = self.indexes.get_mut(field).expect("index exists");
                if let Err(err) = index.insert(doc, id) {
                    // A unique violation during replay leaves nothing loaded
                    self.reset_indexes();
                    return Err(err);
                }
            }
            self.docs.insert(id, doc.clone());
        }

        if state.corrupt_lines > 0 {
            quill_log!(
                Warn,
                "collection '{}': tolerated {} corrupt of {} lines during replay",
                self.name,
                state.corrupt_lines,
                state.total_lines
            );
        }

        self.compact_internal()
    }

    fn compact_internal(&mut self) -> Result<()> {
        let persistence = &mut self.persistence;
        let docs = self.docs.values();
        let indexes = self
            .indexes
            .values()
            .filter(|index| index.field_name() != "_id")
            .map(|index| index.options());
        persistence.persist_cached_database(docs, indexes)?;
        self.events.emit(DbEvent::Compacted);
        Ok(())
    }

    /// True when a document already carries this `_id`.
    fn id_taken(&self, id: &Value) -> bool {
        self.indexes
            .get("_id")
            .map(|index| !index.get_matching(id).is_empty())
            .unwrap_or(false)
    }

    /// Deep-copy, hook, assign `_id`/timestamps and validate one document.
    fn prepare_doc(&mut self, doc: Value) -> Result<Value> {
        let mut doc = match self.hooks.before_insert.clone() {
            Some(hook) => hook(doc)?,
            None => doc,
        };
        let map = doc.as_object_mut().ok_or_else(|| {
            QuillError::Serialization("documents must be objects".to_string())
        })?;

        match map.get("_id") {
            None => {
                // Regenerate on (astronomically unlikely) collision
                let mut id = generate_doc_id();
                while self.id_taken(&Value::String(id.clone())) {
                    id = generate_doc_id();
                }
                map.insert("_id".to_string(), Value::String(id));
            }
            Some(id) => {
                let primitive = !matches!(id, Value::Null | Value::Array(_))
                    && (!id.is_object() || is_date(id));
                if !primitive {
                    return Err(QuillError::InvalidFieldName(
                        "_id must be a non-null primitive".to_string(),
                    ));
                }
            }
        }

        if self.timestamps {
            let now = date_now();
            if !map.contains_key("createdAt") {
                map.insert("createdAt".to_string(), now.clone());
            }
            if !map.contains_key("updatedAt") {
                map.insert("updatedAt".to_string(), now);
            }
        }

        for (key, value) in map.iter() {
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
        Ok(doc)
    }

    /// Index one document in every index, rolling back on failure.
    fn add_document(&mut self, doc: &Value) -> Result<DocId> {
        let id = self.alloc_id();
        let fields = self.index_fields();
        for (done, field) in fields.iter().enumerate() {
            let index = self.indexes.get_mut(field).expect("index exists");
            if let Err(err) = index.insert(doc, id) {
                for field in &fields[..done] {
                    self.indexes
                        .get_mut(field)
                        .expect("index exists")
                        .remove(doc, id);
                }
                return Err(err);
            }
        }
        self.docs.insert(id, doc.clone());
        Ok(id)
    }

    /// Remove one document from every index and the arena.
    fn remove_document(&mut self, id: DocId, doc: &Value) {
        let fields = self.index_fields();
        for field in &fields {
            self.indexes
                .get_mut(field)
                .expect("index exists")
                .remove(doc, id);
        }
        self.docs.remove(&id);
    }

    /// Prepare, index, persist and announce a batch of inserts.
    fn insert_docs(&mut self, docs: Vec<Value>) -> Result<Vec<Value>> {
        let mut prepared = Vec::with_capacity(docs.len());
        for doc in docs {
            prepared.push(self.prepare_doc(doc)?);
        }

        let mut added: Vec<DocId> = Vec::with_capacity(prepared.len());
        for doc in &prepared {
            match self.add_document(doc) {
                Ok(id) => added.push(id),
                Err(err) => {
                    for (id, doc) in added.iter().zip(prepared.iter()) {
                        self.remove_document(*id, doc);
                    }
                    return Err(err);
                }
            }
        }

        self.persistence.persist_new_state(prepared.iter())?;
        if let Some(hook) = self.hooks.after_insert.clone() {
            for doc in &prepared {
                hook(doc);
            }
        }
        Ok(prepared)
    }

    /// Replay `(id, old, new)` pairs through every index; any failure
    /// reverts the indexes already done, leaving the pre-update state.
    fn apply_update_pairs(&mut self, pairs: &[(DocId, Value, Value)]) -> Result<()> {
        let fields = self.index_fields();
        for (done, field) in fields.iter().enumerate() {
            let index = self.indexes.get_mut(field).expect("index exists");
            if let Err(err) = index.update_batch(pairs) {
                for field in fields[..done].iter().rev() {
                    let index = self.indexes.get_mut(field).expect("index exists");
                    for (id, old, new) in pairs.iter().rev() {
                        index.revert_update(old, new, *id);
                    }
                }
                return Err(err);
            }
        }
        for (id, _old, new) in pairs {
            self.docs.insert(*id, new.clone());
        }
        Ok(())
    }

    /// Upsert: synthesize a document from the query's positive equality
    /// clauses (operator updates) or the replacement itself, then insert it.
    fn upsert(&mut self, query: &Query, spec: &UpdateSpec, update: &Value) -> Result<UpdateResult> {
        let base = if spec.is_operators() {
            let mut base = Value::Object(serde_json::Map::new());
            for clause in query.clauses() {
                if let Clause::Field {
                    path,
                    test: FieldTest::Equals(value),
                } = clause
                {
                    set_path(&mut base, path, value.clone());
                }
            }
            spec.apply(&base)?
        } else {
            update.clone()
        };

        let inserted = self.insert_docs(vec![base])?;
        self.events.emit(DbEvent::Updated);
        let inserted_ids = inserted
            .iter()
            .filter_map(|doc| doc.as_object().and_then(|m| m.get("_id")).cloned())
            .collect();
        Ok(UpdateResult {
            acknowledged: true,
            modified_count: 0,
            upsert: true,
            inserted_ids,
            inserted_docs: Some(inserted),
            updated_docs: None,
        })
    }

    // ------------------------------------------------------------------------
    // Candidate selection & TTL
    // ------------------------------------------------------------------------

    /// Candidate set for a query. Unless `dont_expire_stale_docs`, stale TTL
    /// documents encountered here are removed through the normal remove path
    /// (reap failures are logged and skipped, never failing the read).
    fn get_candidates(&mut self, query: &Query, dont_expire_stale_docs: bool) -> Vec<DocId> {
        let candidates = self.plan_candidates(query);
        if dont_expire_stale_docs || self.ttl.is_empty() {
            return candidates;
        }

        let now = now_millis();
        let mut live = Vec::with_capacity(candidates.len());
        let mut stale = Vec::new();
        for id in candidates {
            let doc = match self.docs.get(&id) {
                Some(doc) => doc,
                None => continue,
            };
            if self.is_expired(doc, now) {
                stale.push(id);
            } else {
                live.push(id);
            }
        }
        for id in stale {
            if let Err(err) = self.reap_document(id) {
                quill_log!(Warn, "collection '{}': TTL reap failed: {}", self.name, err);
            }
        }
        live
    }

    fn is_expired(&self, doc: &Value, now: i64) -> bool {
        for (field, seconds) in &self.ttl {
            let resolved = match get_path(doc, field) {
                Some(value) => value,
                None => continue,
            };
            if let Some(ms) = date_millis(&resolved) {
                if ms < now - (seconds * 1000.0) as i64 {
                    return true;
                }
            }
        }
        false
    }

    /// Remove one expired document: hooks, indexes, arena and a tombstone.
    fn reap_document(&mut self, id: DocId) -> Result<()> {
        let doc = match self.docs.get(&id) {
            Some(doc) => doc.clone(),
            None => return Ok(()),
        };
        if let Some(hook) = self.hooks.before_remove.clone() {
            hook(&doc)?;
        }
        self.remove_document(id, &doc);
        if let Some(id_value) = doc.as_object().and_then(|m| m.get("_id")) {
            let tombstone = Persistence::tombstone(id_value);
            self.persistence.persist_new_state([&tombstone])?;
        }
        if let Some(hook) = self.hooks.after_remove.clone() {
            hook(&doc);
        }
        Ok(())
    }

    /// First usable index wins, preferring equality, then `$in`, then a
    /// range; with no usable index every document is a candidate.
    fn plan_candidates(&self, query: &Query) -> Vec<DocId> {
        // Equality on an indexed field
        for clause in query.clauses() {
            if let Clause::Field {
                path,
                test: FieldTest::Equals(value),
            } = clause
            {
                if let Some(index) = self.indexes.get(path) {
                    return index.get_matching(value);
                }
            }
        }
        // $in on an indexed field
        for clause in query.clauses() {
            if let Clause::Field {
                path,
                test: FieldTest::Ops(ops),
            } = clause
            {
                if let Some(index) = self.indexes.get(path) {
                    for op in ops {
                        if let FieldOp::In(values) = op {
                            let refs: Vec<&Value> = values.iter().collect();
                            return index.get_matching_any(&refs);
                        }
                    }
                }
            }
        }
        // Range on an indexed field
        for clause in query.clauses() {
            if let Clause::Field {
                path,
                test: FieldTest::Ops(ops),
            } = clause
            {
                if let Some(index) = self.indexes.get(path) {
                    let mut bounds = KeyBounds::default();
                    for op in ops {
                        match op {
                            FieldOp::Gt(v) => {
                                bounds.gt = Some(IndexKey::from_value(v, self.collation))
                            }
                            FieldOp::Gte(v) => {
                                bounds.gte = Some(IndexKey::from_value(v, self.collation))
                            }
                            FieldOp::Lt(v) => {
                                bounds.lt = Some(IndexKey::from_value(v, self.collation))
                            }
                            FieldOp::Lte(v) => {
                                bounds.lte = Some(IndexKey::from_value(v, self.collation))
                            }
                            _ => {}
                        }
                    }
                    if bounds.gt.is_some()
                        || bounds.gte.is_some()
                        || bounds.lt.is_some()
                        || bounds.lte.is_some()
                    {
                        return index.get_between_bounds(&bounds);
                    }
                }
            }
        }
        // Full scan
        self.indexes
            .get("_id")
            .map(|index| index.get_all())
            .unwrap_or_default()
    }

    /// Create and populate an index; a unique violation during population
    /// drops the half-built index and propagates. Returns false when an
    /// index on the field already exists (no-op, nothing to journal).
    fn build_index(&mut self, options: &IndexOptions) -> Result<bool> {
        if self.indexes.contains_key(&options.field_name) {
            return Ok(false);
        }
        let mut index = Index::new(options.clone(), self.collation);
        for (id, doc) in &self.docs {
            index.insert(doc, *id)?;
        }
        if let Some(seconds) = options.expire_after_seconds {
            self.ttl.insert(options.field_name.clone(), seconds);
        }
        self.indexes.insert(options.field_name.clone(), index);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::date_value;
    use serde_json::json;

    fn memory_collection() -> Collection {
        Collection::new(
            CollectionOptions::new("test.db").with_storage(Box::new(MemoryStorage::new())),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_assigns_generated_id() {
        let collection = memory_collection();
        collection.insert(json!({"a": 1})).unwrap();
        collection.insert(json!({"a": 2})).unwrap();

        let docs = collection.find(json!({})).exec().unwrap();
        assert_eq!(docs.len(), 2);
        for doc in &docs {
            let id = doc["_id"].as_str().unwrap();
            assert_eq!(id.len(), 16);
            assert!(doc["a"] == json!(1) || doc["a"] == json!(2));
        }
    }

    #[test]
    fn test_insert_keeps_user_supplied_id() {
        let collection = memory_collection();
        let doc = collection.insert(json!({"_id": 7, "a": 1})).unwrap();
        assert_eq!(doc["_id"], json!(7));
        assert!(collection.find_one(json!({"_id": 7})).unwrap().is_some());
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let collection = memory_collection();
        collection.insert(json!({"_id": "x"})).unwrap();
        let err = collection.insert(json!({"_id": "x"})).unwrap_err();
        assert!(matches!(err, QuillError::UniqueViolated { .. }));
    }

    #[test]
    fn test_insert_rejects_bad_field_names() {
        let collection = memory_collection();
        assert!(collection.insert(json!({"$bad": 1})).is_err());
        assert!(collection.insert(json!({"a.b": 1})).is_err());
        assert!(collection.insert(json!({"nested": {"$bad": 1}})).is_err());
    }

    #[test]
    fn test_insert_rejects_null_id() {
        let collection = memory_collection();
        assert!(collection.insert(json!({"_id": null})).is_err());
        assert!(collection.insert(json!({"_id": [1]})).is_err());
        assert!(collection.insert(json!({"_id": {"k": 1}})).is_err());
    }

    #[test]
    fn test_unique_index_rejects_second_insert() {
        let collection = memory_collection();
        collection
            .ensure_index(IndexOptions::new("a").with_unique(true))
            .unwrap();
        collection.insert(json!({"a": 1})).unwrap();
        let err = collection.insert(json!({"a": 1})).unwrap_err();
        assert!(matches!(err, QuillError::UniqueViolated { .. }));
        assert_eq!(collection.find(json!({})).exec().unwrap().len(), 1);
    }

    #[test]
    fn test_insert_many_rolls_back_on_conflict() {
        let collection = memory_collection();
        collection
            .ensure_index(IndexOptions::new("a").with_unique(true))
            .unwrap();
        collection.insert(json!({"a": 3})).unwrap();

        let err = collection
            .insert_many(vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})])
            .unwrap_err();
        assert!(matches!(err, QuillError::UniqueViolated { .. }));
        // Nothing from the failed batch survives
        assert_eq!(collection.count(json!({})).unwrap(), 1);
        assert_eq!(collection.count(json!({"a": 1})).unwrap(), 0);
    }

    #[test]
    fn test_find_uses_index_for_equality() {
        let collection = memory_collection();
        collection.ensure_index(IndexOptions::new("city")).unwrap();
        collection.insert(json!({"city": "NYC", "n": 1})).unwrap();
        collection.insert(json!({"city": "LA", "n": 2})).unwrap();

        let docs = collection.find(json!({"city": "NYC"})).exec().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["n"], json!(1));
    }

    #[test]
    fn test_returned_docs_are_deep_copies() {
        let collection = memory_collection();
        collection.insert(json!({"_id": 1, "nested": {"n": 1}})).unwrap();
        let mut doc = collection.find_one(json!({"_id": 1})).unwrap().unwrap();
        doc["nested"]["n"] = json!(999);
        let again = collection.find_one(json!({"_id": 1})).unwrap().unwrap();
        assert_eq!(again["nested"]["n"], json!(1));
    }

    #[test]
    fn test_update_set_single() {
        let collection = memory_collection();
        collection.insert(json!({"_id": 1, "a": 1})).unwrap();
        let result = collection
            .update(json!({"_id": 1}), json!({"$set": {"a": 2}}), UpdateOptions::new())
            .unwrap();
        assert!(result.acknowledged);
        assert_eq!(result.modified_count, 1);
        assert_eq!(
            collection.find_one(json!({"_id": 1})).unwrap().unwrap()["a"],
            json!(2)
        );
    }

    #[test]
    fn test_update_multi() {
        let collection = memory_collection();
        for i in 0..3 {
            collection.insert(json!({"n": i, "flag": false})).unwrap();
        }
        let result = collection
            .update(
                json!({}),
                json!({"$set": {"flag": true}}),
                UpdateOptions::new().with_multi(true),
            )
            .unwrap();
        assert_eq!(result.modified_count, 3);
        assert_eq!(collection.count(json!({"flag": true})).unwrap(), 3);

        // Without multi only the first match changes
        let result = collection
            .update(json!({}), json!({"$set": {"flag": false}}), UpdateOptions::new())
            .unwrap();
        assert_eq!(result.modified_count, 1);
    }

    #[test]
    fn test_update_returns_updated_docs_on_request() {
        let collection = memory_collection();
        collection.insert(json!({"_id": 1, "a": 1})).unwrap();
        let result = collection
            .update(
                json!({"_id": 1}),
                json!({"$inc": {"a": 5}}),
                UpdateOptions::new().with_return_updated_docs(true),
            )
            .unwrap();
        let docs = result.updated_docs.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["a"], json!(6));
    }

    #[test]
    fn test_update_conflict_rolls_everything_back() {
        // The literal multi-index rollback scenario: three unique indexes,
        // one update conflicting on a second field
        let collection = memory_collection();
        for field in ["a", "b"] {
            collection
                .ensure_index(IndexOptions::new(field).with_unique(true))
                .unwrap();
        }
        // No document carries "c" yet; unique + sparse keeps the missing
        // field off the undefined sentinel
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

        // All three documents must be byte-identical to their pre-update form
        let docs = collection.find(json!({})).sort(vec![("a".to_string(), 1)]).exec().unwrap();
        assert_eq!(docs[0], json!({"_id": 1, "a": 1, "b": 10}));
        assert_eq!(docs[1], json!({"_id": 2, "a": 2, "b": 20}));
        assert_eq!(docs[2], json!({"_id": 3, "a": 3, "b": 30}));
        // And the index lookups agree
        assert_eq!(collection.count(json!({"a": 12})).unwrap(), 0);
        assert_eq!(collection.count(json!({"c": {"$exists": true}})).unwrap(), 0);
    }

    #[test]
    fn test_upsert_with_modifiers_merges_positive_clauses() {
        let collection = memory_collection();
        let result = collection
            .update(
                json!({"$or": [{"a": 4}, {"a": 5}], "cac": "rrr"}),
                json!({"$set": {"hello": "world"}, "$inc": {"bloup": 3}}),
                UpdateOptions::new().with_upsert(true),
            )
            .unwrap();
        assert!(result.upsert);
        assert_eq!(result.inserted_ids.len(), 1);

        let docs = collection.find(json!({})).exec().unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc["cac"], json!("rrr"));
        assert_eq!(doc["hello"], json!("world"));
        assert_eq!(doc["bloup"], json!(3));
        assert_eq!(doc["_id"].as_str().unwrap().len(), 16);
        assert!(doc.as_object().unwrap().get("a").is_none());
    }

    #[test]
    fn test_upsert_with_replacement_doc() {
        let collection = memory_collection();
        let result = collection
            .update(
                json!({"missing": true}),
                json!({"fresh": 1}),
                UpdateOptions::new().with_upsert(true),
            )
            .unwrap();
        assert!(result.upsert);
        let doc = &result.inserted_docs.unwrap()[0];
        assert_eq!(doc["fresh"], json!(1));
        assert!(doc.as_object().unwrap().get("missing").is_none());
    }

    #[test]
    fn test_update_without_match_and_without_upsert() {
        let collection = memory_collection();
        let result = collection
            .update(json!({"nope": 1}), json!({"$set": {"a": 1}}), UpdateOptions::new())
            .unwrap();
        assert!(result.acknowledged);
        assert_eq!(result.modified_count, 0);
        assert!(!result.upsert);
    }

    #[test]
    fn test_remove_single_and_multi() {
        let collection = memory_collection();
        for i in 0..4 {
            collection.insert(json!({ "n": i })).unwrap();
        }
        assert_eq!(
            collection.remove(json!({"n": {"$gte": 2}}), RemoveOptions::new()).unwrap(),
            1
        );
        assert_eq!(
            collection
                .remove(json!({}), RemoveOptions::new().with_multi(true))
                .unwrap(),
            3
        );
        assert_eq!(collection.count(json!({})).unwrap(), 0);
    }

    #[test]
    fn test_ensure_index_is_idempotent() {
        let collection = memory_collection();
        collection.ensure_index(IndexOptions::new("a")).unwrap();
        collection
            .ensure_index(IndexOptions::new("a").with_unique(true))
            .unwrap();
        assert_eq!(collection.list_indexes(), vec!["_id".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_ensure_index_fails_on_existing_duplicates() {
        let collection = memory_collection();
        collection.insert(json!({"a": 1})).unwrap();
        collection.insert(json!({"a": 1})).unwrap();
        let err = collection
            .ensure_index(IndexOptions::new("a").with_unique(true))
            .unwrap_err();
        assert!(matches!(err, QuillError::UniqueViolated { .. }));
        // The half-built index is gone
        assert_eq!(collection.list_indexes(), vec!["_id".to_string()]);
    }

    #[test]
    fn test_remove_index() {
        let collection = memory_collection();
        collection.ensure_index(IndexOptions::new("a")).unwrap();
        collection.remove_index("a").unwrap();
        assert_eq!(collection.list_indexes(), vec!["_id".to_string()]);
        assert!(collection.remove_index("_id").is_err());
    }

    #[test]
    fn test_sparse_unique_allows_missing_fields() {
        let collection = memory_collection();
        collection
            .ensure_index(IndexOptions::new("email").with_unique(true).with_sparse(true))
            .unwrap();
        collection.insert(json!({"n": 1})).unwrap();
        collection.insert(json!({"n": 2})).unwrap();
        // Without sparse the undefined sentinel would collide
        collection.insert(json!({"email": "a@b.c"})).unwrap();
        assert!(collection.insert(json!({"email": "a@b.c"})).is_err());
    }

    #[test]
    fn test_ttl_reaps_on_read() {
        let collection = memory_collection();
        collection
            .ensure_index(IndexOptions::new("exp").with_expire_after_seconds(0.05))
            .unwrap();
        collection
            .insert(json!({"hello": "world", "exp": date_value(now_millis())}))
            .unwrap();
        assert_eq!(collection.count(json!({})).unwrap(), 1);

        std::thread::sleep(Duration::from_millis(70));
        assert!(collection.find_one(json!({})).unwrap().is_none());
        assert_eq!(collection.count(json!({})).unwrap(), 0);
    }

    #[test]
    fn test_timestamps_are_maintained() {
        let collection = Collection::new(
            CollectionOptions::new("test.db")
                .with_storage(Box::new(MemoryStorage::new()))
                .with_timestamps(true),
        )
        .unwrap();
        let doc = collection.insert(json!({"_id": 1, "a": 1})).unwrap();
        assert!(is_date(&doc["createdAt"]));
        assert!(is_date(&doc["updatedAt"]));
        let created = doc["createdAt"].clone();

        std::thread::sleep(Duration::from_millis(5));
        collection
            .update(json!({"_id": 1}), json!({"$set": {"a": 2}}), UpdateOptions::new())
            .unwrap();
        let updated = collection.find_one(json!({"_id": 1})).unwrap().unwrap();
        assert_eq!(updated["createdAt"], created);
        assert_ne!(updated["updatedAt"], updated["createdAt"]);
    }

    #[test]
    fn test_hooks_transform_and_observe() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let after_inserts = Arc::new(AtomicUsize::new(0));
        let counter = after_inserts.clone();

        let hooks = Hooks {
            before_insert: Some(Arc::new(|mut doc: Value| {
                set_path(&mut doc, "stamped", json!(true));
                Ok(doc)
            })),
            after_insert: Some(Arc::new(move |_doc: &Value| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };
        let collection = Collection::new(
            CollectionOptions::new("test.db")
                .with_storage(Box::new(MemoryStorage::new()))
                .with_hooks(hooks),
        )
        .unwrap();

        let doc = collection.insert(json!({"a": 1})).unwrap();
        assert_eq!(doc["stamped"], json!(true));
        assert_eq!(after_inserts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_before_remove_can_veto() {
        let hooks = Hooks {
            before_remove: Some(Arc::new(|doc: &Value| {
                if doc["protected"] == json!(true) {
                    Err(QuillError::InvalidQuery("protected document".to_string()))
                } else {
                    Ok(())
                }
            })),
            ..Default::default()
        };
        let collection = Collection::new(
            CollectionOptions::new("test.db")
                .with_storage(Box::new(MemoryStorage::new()))
                .with_hooks(hooks),
        )
        .unwrap();
        collection.insert(json!({"_id": 1, "protected": true})).unwrap();
        assert!(collection.remove(json!({"_id": 1}), RemoveOptions::new()).is_err());
        assert_eq!(collection.count(json!({})).unwrap(), 1);
    }

    #[test]
    fn test_events_emitted() {
        let collection = memory_collection();
        let rx = collection.subscribe();
        collection.insert(json!({"a": 1})).unwrap();
        collection.compact_datafile().unwrap();
        let events: Vec<DbEvent> = rx.try_iter().collect();
        assert!(events.contains(&DbEvent::Updated));
        assert!(events.contains(&DbEvent::Compacted));
    }

    #[test]
    fn test_ready_event_on_load() {
        let collection = Collection::new(
            CollectionOptions::new("test.db")
                .with_storage(Box::new(MemoryStorage::new()))
                .with_autoload(false),
        )
        .unwrap();
        let rx = collection.subscribe();
        collection.load_database().unwrap();
        let events: Vec<DbEvent> = rx.try_iter().collect();
        assert!(events.contains(&DbEvent::Ready));
    }

    #[test]
    fn test_lazy_load_before_first_call() {
        let collection = Collection::new(
            CollectionOptions::new("test.db")
                .with_storage(Box::new(MemoryStorage::new()))
                .with_autoload(false),
        )
        .unwrap();
        // No explicit load_database; the call performs it
        collection.insert(json!({"a": 1})).unwrap();
        assert_eq!(collection.count(json!({})).unwrap(), 1);
    }

    #[test]
    fn test_in_memory_only_collection() {
        let collection = Collection::new(
            CollectionOptions::new("ephemeral.db").in_memory_only(),
        )
        .unwrap();
        collection.insert(json!({"a": 1})).unwrap();
        assert_eq!(collection.count(json!({})).unwrap(), 1);
        collection.compact_datafile().unwrap();
    }

    #[test]
    fn test_range_query_via_index() {
        let collection = memory_collection();
        collection.ensure_index(IndexOptions::new("n")).unwrap();
        for i in 0..10 {
            collection.insert(json!({ "n": i })).unwrap();
        }
        let docs = collection
            .find(json!({"n": {"$gte": 3, "$lt": 6}}))
            .sort(vec![("n".to_string(), 1)])
            .exec()
            .unwrap();
        let values: Vec<i64> = docs.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn test_in_query_via_index() {
        let collection = memory_collection();
        collection.ensure_index(IndexOptions::new("n")).unwrap();
        for i in 0..10 {
            collection.insert(json!({ "n": i })).unwrap();
        }
        let docs = collection.find(json!({"n": {"$in": [2, 4, 99]}})).exec().unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_cursor_pipeline() {
        let collection = memory_collection();
        for i in 0..10 {
            collection.insert(json!({"n": i, "tag": "x"})).unwrap();
        }
        let docs = collection
            .find(json!({"tag": "x"}))
            .sort(vec![("n".to_string(), -1)])
            .skip(2)
            .limit(3)
            .projection(HashMap::from([("n".to_string(), 1), ("_id".to_string(), 0)]))
            .exec()
            .unwrap();
        assert_eq!(docs, vec![json!({"n": 7}), json!({"n": 6}), json!({"n": 5})]);
    }
}
