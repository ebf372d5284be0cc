//! Listener lifecycle: cancellation handles, RAII guards, keyed registries and
//! the reconnecting feed pump the synchronizers run on.

use crate::store::{Document, DocumentStore, Query, SnapshotEvent, StoreError};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::cell::RefCell;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

struct ListenerState {
    active: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
    /// Held for the duration of every callback.
    delivery: Mutex<()>,
}

/// Shared cancellation state of one running listener. Clones observe and
/// cancel the same listener.
#[derive(Clone)]
pub struct ListenerHandle {
    state: Arc<ListenerState>,
}

impl Default for ListenerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ListenerState {
                active: AtomicBool::new(true),
                task: Mutex::new(None),
                delivery: Mutex::new(()),
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Bind the task driving this listener. Aborted immediately if the
    /// listener was already cancelled.
    pub fn attach(&self, task: AbortHandle) {
        let mut slot = self.state.task.lock().unwrap_or_else(|p| p.into_inner());
        if self.is_active() {
            *slot = Some(task);
        } else {
            task.abort();
        }
    }

    /// Run `callback` unless the listener has been cancelled. Deliveries are
    /// serialized against [`ListenerHandle::cancel`].
    pub fn deliver(&self, callback: impl FnOnce()) {
        let _gate = self.state.delivery.lock().unwrap_or_else(|p| p.into_inner());
        if !self.is_active() {
            return;
        }
        let _marker = DeliveryMarker::enter(self.key());
        callback();
    }

    /// Idempotent. Once this returns no callback is running or will run,
    /// unless called from inside one of this listener's own callbacks.
    pub fn cancel(&self) {
        if self.state.active.swap(false, Ordering::SeqCst) {
            let task = self
                .state
                .task
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .take();
            if let Some(task) = task {
                task.abort();
            }
        }
        if !DeliveryMarker::is_inside(self.key()) {
            drop(self.state.delivery.lock().unwrap_or_else(|p| p.into_inner()));
        }
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }
}

thread_local! {
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks the current thread as running a callback for one listener.
struct DeliveryMarker(usize);

impl DeliveryMarker {
    fn enter(key: usize) -> Self {
        DELIVERING.with(|keys| keys.borrow_mut().push(key));
        Self(key)
    }

    fn is_inside(key: usize) -> bool {
        DELIVERING.with(|keys| keys.borrow().contains(&key))
    }
}

impl Drop for DeliveryMarker {
    fn drop(&mut self) {
        DELIVERING.with(|keys| {
            let mut keys = keys.borrow_mut();
            if let Some(pos) = keys.iter().rposition(|key| *key == self.0) {
                keys.remove(pos);
            }
        });
    }
}

/// Owning guard for a listener; dropping it cancels the listener.
#[must_use = "dropping a Subscription cancels it immediately"]
pub struct Subscription {
    handle: ListenerHandle,
}

impl Subscription {
    pub fn new(handle: ListenerHandle) -> Self {
        Self { handle }
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn handle(&self) -> ListenerHandle {
        self.handle.clone()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Active listeners of one kind, keyed by conversation or user id.
pub struct ListenerRegistry<K> {
    kind: &'static str,
    listeners: Mutex<HashMap<K, ListenerHandle>>,
}

impl<K> ListenerRegistry<K>
where
    K: Eq + Hash + Display,
{
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, HashMap<K, ListenerHandle>> {
        self.listeners.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Track `handle` under `key`, cancelling whatever was registered there before.
    pub fn register(&self, key: K, handle: ListenerHandle) {
        let kind = self.kind;
        debug!(kind, %key, "registering listener");
        if let Some(previous) = self.listeners().insert(key, handle) {
            debug!(kind, "replaced existing listener");
            previous.cancel();
        }
    }

    /// Cancel and forget the listener under `key`. Returns whether one existed.
    pub fn remove(&self, key: &K) -> bool {
        match self.listeners().remove(key) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.listeners().get(key).is_some_and(ListenerHandle::is_active)
    }

    /// Cancel everything. Returns how many listeners were still active.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<ListenerHandle> = self.listeners().drain().map(|(_, h)| h).collect();
        let active = drained.iter().filter(|h| h.is_active()).count();
        for handle in drained {
            handle.cancel();
        }
        active
    }

    pub fn len(&self) -> usize {
        self.listeners().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners().is_empty()
    }
}

/// Exponential backoff with a retry ceiling, used when a feed closes under a
/// live listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2,
            max_retries: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` once the
    /// circuit should open.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let factor = self.multiplier.max(1).saturating_pow(attempt - 1);
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

/// What a feed pump hands to its consumer.
#[derive(Debug)]
pub(crate) enum FeedEvent {
    Snapshot(Vec<Document>),
    Error(StoreError),
    /// Reconnection gave up after this many attempts; the pump has stopped.
    RetriesExhausted(u32),
}

/// Drive `query` on a spawned task until `handle` is cancelled, passing every
/// event to `on_event`. A feed closing under a live listener is re-opened
/// with `backoff`.
pub(crate) fn spawn_feed<F, Fut>(
    store: Arc<dyn DocumentStore>,
    query: Query,
    backoff: BackoffPolicy,
    handle: ListenerHandle,
    mut on_event: F,
) where
    F: FnMut(FeedEvent) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let task_handle = handle.clone();
    let task = tokio::spawn(async move {
        let handle = task_handle;
        let mut attempt = 0u32;
        loop {
            match store.subscribe(query.clone()) {
                Ok(mut feed) => {
                    while let Some(event) = feed.next().await {
                        if !handle.is_active() {
                            return;
                        }
                        match event {
                            SnapshotEvent::Snapshot(docs) => {
                                attempt = 0;
                                on_event(FeedEvent::Snapshot(docs)).await;
                            }
                            SnapshotEvent::Error(err) => on_event(FeedEvent::Error(err)).await,
                        }
                    }
                    if !handle.is_active() {
                        return;
                    }
                    warn!(collection = %query.collection, "snapshot feed closed");
                }
                Err(err) => {
                    warn!(collection = %query.collection, error = %err, "subscribe failed");
                    on_event(FeedEvent::Error(err)).await;
                }
            }

            attempt += 1;
            match backoff.delay(attempt) {
                Some(delay) => {
                    debug!(attempt, ?delay, "re-subscribing after backoff");
                    tokio::time::sleep(delay).await;
                    if !handle.is_active() {
                        return;
                    }
                }
                None => {
                    warn!(collection = %query.collection, attempt, "giving up on snapshot feed");
                    on_event(FeedEvent::RetriesExhausted(attempt - 1)).await;
                    handle.cancel();
                    return;
                }
            }
        }
    });
    handle.attach(task.abort_handle());
}
