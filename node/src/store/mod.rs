//! Document store seam: named collections of JSON documents with partial
//! updates, atomic batches and push subscriptions.

mod memory;
mod query;

pub use memory::MemoryStore;
pub use query::{Direction, Filter, Query};

use async_trait::async_trait;
use pawmatch_model::Timestamp;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Collection names shared by the engines.
pub mod collections {
    pub const MATCHES: &str = "matches";
    pub const CONVERSATIONS: &str = "conversations";
    pub const MESSAGES: &str = "messages";
    pub const PETS: &str = "pets";
    pub const USERS: &str = "users";
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Path into a document. Text paths are dotted, e.g. `typing.u1`; segments
/// given to [`FieldPath::nested`] are taken literally and never split.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into().split('.').map(str::to_owned).collect())
    }

    /// Path from literal segments. Use this whenever a segment is user data.
    pub fn nested<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// A single top-level field, dots included.
    pub fn top(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for FieldPath {
    fn from(path: String) -> Self {
        Self::new(path)
    }
}

/// Value written to a single field. Everything except `Set` is resolved by the
/// store at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Set(Value),
    ServerTimestamp,
    Increment(f64),
    ArrayUnion(Vec<Value>),
}

/// Field-scoped write payload. Fields not named are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(FieldPath, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `Set` per top-level field of a serialized record.
    pub fn from_record<T: Serialize>(record: &T) -> StoreResult<Self> {
        match serde_json::to_value(record)? {
            Value::Object(map) => Ok(Self(
                map.into_iter()
                    .map(|(key, value)| (FieldPath::top(key), FieldValue::Set(value)))
                    .collect(),
            )),
            other => Err(StoreError::Serialization(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    pub fn set(mut self, path: impl Into<FieldPath>, value: impl Into<Value>) -> Self {
        self.0.push((path.into(), FieldValue::Set(value.into())));
        self
    }

    pub fn server_timestamp(mut self, path: impl Into<FieldPath>) -> Self {
        self.0.push((path.into(), FieldValue::ServerTimestamp));
        self
    }

    pub fn increment(mut self, path: impl Into<FieldPath>, by: f64) -> Self {
        self.0.push((path.into(), FieldValue::Increment(by)));
        self
    }

    pub fn array_union(mut self, path: impl Into<FieldPath>, values: Vec<Value>) -> Self {
        self.0.push((path.into(), FieldValue::ArrayUnion(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FieldPath, FieldValue)> {
        self.0.iter()
    }
}

/// A stored document. `data` always carries the id under `"id"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, mut data: Map<String, Value>) -> Self {
        let id = id.into();
        data.insert("id".to_owned(), Value::String(id.clone()));
        Self { id, data }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }

    pub fn field(&self, path: &FieldPath) -> Option<&Value> {
        let mut segments = path.segments();
        let mut current = self.data.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Fails with `AlreadyExists` if the id is taken.
    Create {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Fails with `NotFound` if the document is missing.
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    /// Update that creates the document when it is missing.
    Merge {
        collection: String,
        id: String,
        fields: Fields,
    },
}

impl WriteOp {
    pub fn create(collection: &str, id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Create {
            collection: collection.to_owned(),
            id: id.into(),
            fields,
        }
    }

    pub fn update(collection: &str, id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Update {
            collection: collection.to_owned(),
            id: id.into(),
            fields,
        }
    }

    pub fn merge(collection: &str, id: impl Into<String>, fields: Fields) -> Self {
        WriteOp::Merge {
            collection: collection.to_owned(),
            id: id.into(),
            fields,
        }
    }

    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Create { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Merge { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Full, ordered result set of the subscribed query.
    Snapshot(Vec<Document>),
    /// Transient failure. The feed stays open.
    Error(StoreError),
}

/// Deregisters a store-side listener when dropped.
pub struct StoreListener {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl StoreListener {
    pub fn new(detach: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }
}

impl Drop for StoreListener {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

/// Stream of pushed snapshots for one query. `next` yields `None` once the
/// store side has gone away.
pub struct SnapshotFeed {
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
    _listener: StoreListener,
}

impl SnapshotFeed {
    pub fn new(events: mpsc::UnboundedReceiver<SnapshotEvent>, listener: StoreListener) -> Self {
        Self {
            events,
            _listener: listener,
        }
    }

    pub async fn next(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn new_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Monotonic server clock in epoch milliseconds.
    async fn server_timestamp(&self) -> Timestamp;

    async fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Applies every op or none of them.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> StoreResult<()>;

    async fn query(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Initial snapshot is pushed immediately, then one per visible change.
    fn subscribe(&self, query: Query) -> StoreResult<SnapshotFeed>;

    async fn create(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.batch_write(vec![WriteOp::create(collection, id, fields)])
            .await
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        self.batch_write(vec![WriteOp::update(collection, id, fields)])
            .await
    }
}
