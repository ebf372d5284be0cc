//! In-process document store with push subscriptions and optional sled persistence.

use super::{
    Document, DocumentStore, FieldPath, FieldValue, Fields, Query, SnapshotEvent, SnapshotFeed,
    StoreError, StoreListener, StoreResult, WriteOp,
};
use crate::storage::DocumentArchive;
use async_trait::async_trait;
use pawmatch_model::{now_ms, Timestamp};
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Collections = HashMap<String, BTreeMap<String, Document>>;

struct ListenerEntry {
    query: Query,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
    last: Option<Vec<Document>>,
}

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    entries: HashMap<u64, ListenerEntry>,
}

struct StoreInner {
    collections: RwLock<Collections>,
    listeners: Mutex<ListenerTable>,
    clock: AtomicI64,
    faults: Mutex<HashSet<String>>,
    archive: Option<DocumentArchive>,
}

/// Cheap to clone; clones share the same documents and listeners.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(Collections::new(), None)
    }

    /// Open a store persisted under `path`, reloading whatever was committed before.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let archive = DocumentArchive::open(path.as_ref())
            .map_err(|e| StoreError::Persistence(format!("{e:#}")))?;
        let mut collections = Collections::new();
        let mut restored = 0usize;
        for (collection, document) in archive
            .load_all()
            .map_err(|e| StoreError::Persistence(format!("{e:#}")))?
        {
            collections
                .entry(collection)
                .or_default()
                .insert(document.id.clone(), document);
            restored += 1;
        }
        info!(path = ?path.as_ref(), restored, "opened document store");
        Ok(Self::build(collections, Some(archive)))
    }

    fn build(collections: Collections, archive: Option<DocumentArchive>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                collections: RwLock::new(collections),
                listeners: Mutex::new(ListenerTable::default()),
                clock: AtomicI64::new(0),
                faults: Mutex::new(HashSet::new()),
                archive,
            }),
        }
    }

    /// Reject every subsequent write touching `collection`, including whole
    /// batches that merely contain such a write.
    pub fn fail_writes_to(&self, collection: &str) {
        lock(&self.inner.faults).insert(collection.to_owned());
    }

    pub fn clear_faults(&self) {
        lock(&self.inner.faults).clear();
    }

    /// Push a transient error to every open listener without closing them.
    pub fn report_error(&self, error: StoreError) {
        let table = lock(&self.inner.listeners);
        for entry in table.entries.values() {
            let _ = entry.tx.send(SnapshotEvent::Error(error.clone()));
        }
    }

    /// Drop every listener as if the transport had gone away.
    pub fn disconnect_listeners(&self) {
        let mut table = lock(&self.inner.listeners);
        let dropped = table.entries.len();
        table.entries.clear();
        warn!(dropped, "disconnected all store listeners");
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).entries.len()
    }

    /// Number of documents currently in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        read(&self.inner.collections)
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    fn tick(&self) -> Timestamp {
        let now = now_ms();
        let mut current = self.inner.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(current + 1);
            match self.inner.clock.compare_exchange(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    fn commit(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<String>> {
        {
            let faults = lock(&self.inner.faults);
            if let Some(op) = ops.iter().find(|op| faults.contains(op.collection())) {
                return Err(StoreError::Rejected(format!(
                    "writes to {} are failing",
                    op.collection()
                )));
            }
        }

        let now = self.tick();
        let mut collections = write(&self.inner.collections);
        let mut staged: BTreeMap<(String, String), Document> = BTreeMap::new();

        for op in &ops {
            match op {
                WriteOp::Create {
                    collection,
                    id,
                    fields,
                } => {
                    let key = (collection.clone(), id.clone());
                    let exists = staged.contains_key(&key)
                        || collections
                            .get(collection)
                            .is_some_and(|docs| docs.contains_key(id));
                    if exists {
                        return Err(StoreError::AlreadyExists {
                            collection: collection.clone(),
                            id: id.clone(),
                        });
                    }
                    let mut document = Document::new(id.clone(), Map::new());
                    apply_fields(&mut document.data, fields, now)?;
                    document.data.insert("id".to_owned(), Value::String(id.clone()));
                    staged.insert(key, document);
                }
                WriteOp::Update {
                    collection,
                    id,
                    fields,
                }
                | WriteOp::Merge {
                    collection,
                    id,
                    fields,
                } => {
                    let key = (collection.clone(), id.clone());
                    let existing = staged.remove(&key).or_else(|| {
                        collections
                            .get(collection)
                            .and_then(|docs| docs.get(id))
                            .cloned()
                    });
                    let mut document = match (existing, op) {
                        (Some(document), _) => document,
                        (None, WriteOp::Merge { .. }) => Document::new(id.clone(), Map::new()),
                        (None, _) => {
                            return Err(StoreError::NotFound {
                                collection: collection.clone(),
                                id: id.clone(),
                            })
                        }
                    };
                    apply_fields(&mut document.data, fields, now)?;
                    document.data.insert("id".to_owned(), Value::String(id.clone()));
                    staged.insert(key, document);
                }
            }
        }

        if let Some(archive) = &self.inner.archive {
            let documents: Vec<(&str, &Document)> = staged
                .iter()
                .map(|((collection, _), document)| (collection.as_str(), document))
                .collect();
            archive
                .write(&documents)
                .map_err(|e| StoreError::Persistence(format!("{e:#}")))?;
        }

        let mut touched = Vec::new();
        for ((collection, id), document) in staged {
            if !touched.contains(&collection) {
                touched.push(collection.clone());
            }
            collections.entry(collection).or_default().insert(id, document);
        }
        debug!(ops = ops.len(), ?touched, "committed batch");
        Ok(touched)
    }

    fn notify(&self, touched: &[String]) {
        let collections = read(&self.inner.collections);
        let mut table = lock(&self.inner.listeners);
        table.entries.retain(|_, entry| {
            if !touched.contains(&entry.query.collection) {
                return true;
            }
            let snapshot = evaluate(&collections, &entry.query);
            if entry.last.as_ref() == Some(&snapshot) {
                return true;
            }
            entry.last = Some(snapshot.clone());
            entry.tx.send(SnapshotEvent::Snapshot(snapshot)).is_ok()
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn server_timestamp(&self) -> Timestamp {
        self.tick()
    }

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        Ok(read(&self.inner.collections)
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let touched = self.commit(ops)?;
        self.notify(&touched);
        // Fsync outside the collection lock.
        if let Some(archive) = &self.inner.archive {
            archive
                .flush()
                .await
                .map_err(|e| StoreError::Persistence(format!("{e:#}")))?;
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>> {
        Ok(evaluate(&read(&self.inner.collections), query))
    }

    fn subscribe(&self, query: Query) -> StoreResult<SnapshotFeed> {
        let (tx, rx) = mpsc::unbounded_channel();
        let collections = read(&self.inner.collections);
        let snapshot = evaluate(&collections, &query);

        let mut table = lock(&self.inner.listeners);
        let id = table.next_id;
        table.next_id += 1;
        tx.send(SnapshotEvent::Snapshot(snapshot.clone()))
            .map_err(|_| StoreError::Unavailable("listener closed during registration".into()))?;
        debug!(id, collection = %query.collection, "registered store listener");
        table.entries.insert(
            id,
            ListenerEntry {
                query,
                tx,
                last: Some(snapshot),
            },
        );

        let weak: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let listener = StoreListener::new(move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.listeners).entries.remove(&id);
            }
        });
        Ok(SnapshotFeed::new(rx, listener))
    }
}

fn evaluate(collections: &Collections, query: &Query) -> Vec<Document> {
    collections
        .get(&query.collection)
        .map(|docs| query.apply(docs.values()))
        .unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn apply_fields(data: &mut Map<String, Value>, fields: &Fields, now: Timestamp) -> StoreResult<()> {
    for (path, value) in fields.iter() {
        let (parent, key) = parent_mut(data, path)?;
        let resolved = match value {
            FieldValue::Set(value) => value.clone(),
            FieldValue::ServerTimestamp => Value::from(now),
            FieldValue::Increment(by) => increment(parent.get(key), *by, path)?,
            FieldValue::ArrayUnion(values) => {
                let mut items = match parent.remove(key) {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(StoreError::Rejected(format!(
                            "array union on non-array field {path}"
                        )))
                    }
                };
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
                Value::Array(items)
            }
        };
        parent.insert(key.to_owned(), resolved);
    }
    Ok(())
}

/// Object holding the leaf named by `path`, creating intermediate objects on the way.
fn parent_mut<'a, 'p>(
    data: &'a mut Map<String, Value>,
    path: &'p FieldPath,
) -> StoreResult<(&'a mut Map<String, Value>, &'p str)> {
    let segments: Vec<&'p str> = path.segments().collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(StoreError::Rejected("empty field path".into()));
    };
    let mut current = data;
    for segment in parents {
        let entry = current
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        current = entry
            .as_object_mut()
            .ok_or_else(|| StoreError::Rejected(format!("{segment} in {path} is not an object")))?;
    }
    if leaf.is_empty() {
        return Err(StoreError::Rejected(format!("malformed field path {path}")));
    }
    Ok((current, leaf))
}

fn increment(current: Option<&Value>, by: f64, path: &FieldPath) -> StoreResult<Value> {
    let current = match current {
        None | Some(Value::Null) => Number::from(0),
        Some(Value::Number(n)) => n.clone(),
        Some(_) => {
            return Err(StoreError::Rejected(format!(
                "increment on non-numeric field {path}"
            )))
        }
    };
    if let (Some(base), true) = (current.as_i64(), by.fract() == 0.0) {
        return Ok(Value::from(base + by as i64));
    }
    let sum = current.as_f64().unwrap_or_default() + by;
    Ok(Number::from_f64(sum).map(Value::Number).unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Direction;
    use serde_json::json;

    fn conversation_fields() -> Fields {
        Fields::new()
            .set("participants", json!(["u1", "p1"]))
            .set("status", "active")
            .server_timestamp("lastMessageAt")
    }

    #[tokio::test]
    async fn test_partial_updates_touch_only_named_fields() {
        let store = MemoryStore::new();
        store
            .create("conversations", "c1", conversation_fields())
            .await
            .unwrap();

        store
            .update("conversations", "c1", Fields::new().set("typing.u1", true))
            .await
            .unwrap();
        store
            .update("conversations", "c1", Fields::new().set("typing.p1", false))
            .await
            .unwrap();

        let doc = store.get("conversations", "c1").await.unwrap().unwrap();
        assert_eq!(doc.data["typing"], json!({ "u1": true, "p1": false }));
        assert_eq!(doc.data["status"], "active");
        assert_eq!(doc.data["id"], "c1");
    }

    #[tokio::test]
    async fn test_increment_and_array_union() {
        let store = MemoryStore::new();
        store
            .create("pets", "p1", Fields::new().set("name", "Rex"))
            .await
            .unwrap();

        let bump = || {
            Fields::new()
                .increment("matchRate", 0.1)
                .increment("superLikes", 1.0)
                .array_union("matches", vec![json!("u1")])
        };
        store.update("pets", "p1", bump()).await.unwrap();
        store.update("pets", "p1", bump()).await.unwrap();

        let doc = store.get("pets", "p1").await.unwrap().unwrap();
        assert!((doc.data["matchRate"].as_f64().unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(doc.data["superLikes"], json!(2));
        assert_eq!(doc.data["matches"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryStore::new();
        let result = store
            .batch_write(vec![
                WriteOp::create("conversations", "c1", conversation_fields()),
                WriteOp::update("pets", "missing", Fields::new().set("name", "x")),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert_eq!(store.count("conversations"), 0);
    }

    #[tokio::test]
    async fn test_injected_fault_rejects_whole_batch() {
        let store = MemoryStore::new();
        store.fail_writes_to("messages");

        let result = store
            .batch_write(vec![
                WriteOp::create("conversations", "c1", conversation_fields()),
                WriteOp::create("messages", "m1", Fields::new().set("content", "hi")),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::Rejected(_))));
        assert_eq!(store.count("conversations"), 0);
        assert_eq!(store.count("messages"), 0);

        store.clear_faults();
        store
            .create("messages", "m1", Fields::new().set("content", "hi"))
            .await
            .unwrap();
        assert_eq!(store.count("messages"), 1);
    }

    #[tokio::test]
    async fn test_merge_upserts() {
        let store = MemoryStore::new();
        store
            .batch_write(vec![WriteOp::merge(
                "users",
                "u1",
                Fields::new().server_timestamp("settings.lastMatch"),
            )])
            .await
            .unwrap();
        store
            .batch_write(vec![WriteOp::merge(
                "users",
                "u1",
                Fields::new().set("settings.theme", "dark"),
            )])
            .await
            .unwrap();

        let doc = store.get("users", "u1").await.unwrap().unwrap();
        assert!(doc.data["settings"]["lastMatch"].is_i64());
        assert_eq!(doc.data["settings"]["theme"], "dark");
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let store = MemoryStore::new();
        store.create("matches", "m1", Fields::new()).await.unwrap();
        let again = store.create("matches", "m1", Fields::new()).await;
        assert!(matches!(again, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_server_timestamps_are_monotonic() {
        let store = MemoryStore::new();
        let mut previous = store.server_timestamp().await;
        for _ in 0..100 {
            let next = store.server_timestamp().await;
            assert!(next > previous);
            previous = next;
        }
    }

    #[tokio::test]
    async fn test_subscription_pushes_initial_and_changed_snapshots() {
        let store = MemoryStore::new();
        let query = Query::collection("messages")
            .where_eq("conversationId", "c1")
            .order_by("createdAt", Direction::Descending);
        let mut feed = store.subscribe(query).unwrap();

        assert_eq!(feed.next().await, Some(SnapshotEvent::Snapshot(vec![])));

        store
            .create(
                "messages",
                "m1",
                Fields::new()
                    .set("conversationId", "c1")
                    .server_timestamp("createdAt"),
            )
            .await
            .unwrap();
        // Unrelated write: result set unchanged, nothing pushed.
        store
            .create("messages", "m2", Fields::new().set("conversationId", "c2"))
            .await
            .unwrap();
        store
            .create(
                "messages",
                "m3",
                Fields::new()
                    .set("conversationId", "c1")
                    .server_timestamp("createdAt"),
            )
            .await
            .unwrap();

        let Some(SnapshotEvent::Snapshot(first)) = feed.next().await else {
            panic!("expected snapshot");
        };
        assert_eq!(first.len(), 1);
        let Some(SnapshotEvent::Snapshot(second)) = feed.next().await else {
            panic!("expected snapshot");
        };
        let ids: Vec<_> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m1"]);
    }

    #[tokio::test]
    async fn test_errors_do_not_close_feed_and_drop_deregisters() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe(Query::collection("pets")).unwrap();
        assert_eq!(store.listener_count(), 1);
        let _ = feed.next().await;

        store.report_error(StoreError::Unavailable("flaky".into()));
        assert_eq!(
            feed.next().await,
            Some(SnapshotEvent::Error(StoreError::Unavailable("flaky".into())))
        );

        store.create("pets", "p1", Fields::new()).await.unwrap();
        assert!(matches!(feed.next().await, Some(SnapshotEvent::Snapshot(_))));

        drop(feed);
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_closes_feeds() {
        let store = MemoryStore::new();
        let mut feed = store.subscribe(Query::collection("pets")).unwrap();
        let _ = feed.next().await;
        store.disconnect_listeners();
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn test_persistent_store_reloads_committed_documents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open(dir.path()).unwrap();
            store
                .create("pets", "p1", Fields::new().set("name", "Rex"))
                .await
                .unwrap();
        }
        let store = MemoryStore::open(dir.path()).unwrap();
        let doc = store.get("pets", "p1").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "Rex");
    }
}
