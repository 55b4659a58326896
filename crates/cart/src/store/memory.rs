//! In-process cart store.
//!
//! Each user's cart is a `tokio::sync::watch` channel of raw records, so
//! subscribers always see the latest full snapshot. The store can inject
//! failures, hold writes in flight, and drop live subscriptions, which makes
//! it the backend of choice for tests and offline demos.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_stream::stream;
use serde_json::Value;
use shopez_core::{ProductId, UserId};
use tokio::sync::watch;
use tracing::debug;

use super::{CartSnapshot, CartStore, SnapshotStream, StoreError};

type Records = BTreeMap<String, Value>;

/// Cart store held entirely in memory.
#[derive(Clone)]
pub struct MemoryCartStore {
    inner: Arc<MemoryCartStoreInner>,
}

struct MemoryCartStoreInner {
    carts: Mutex<HashMap<UserId, watch::Sender<Records>>>,
    faults: Mutex<Faults>,
    writes_paused: watch::Sender<bool>,
    disconnects: watch::Sender<u64>,
    operations: AtomicU64,
}

#[derive(Default)]
struct Faults {
    reads: u32,
    writes: u32,
    subscribes: u32,
}

#[derive(Clone, Copy)]
enum FaultKind {
    Read,
    Write,
    Subscribe,
}

impl Default for MemoryCartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCartStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryCartStoreInner {
                carts: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                writes_paused: watch::channel(false).0,
                disconnects: watch::channel(0).0,
                operations: AtomicU64::new(0),
            }),
        }
    }

    /// Store a raw record without validation.
    ///
    /// Lets tests and demos seed data exactly as another client might have
    /// written it, malformed entries included.
    pub fn insert_raw(&self, user: &UserId, key: impl Into<String>, record: Value) {
        let key = key.into();
        self.cart(user).send_modify(|records| {
            records.insert(key, record);
        });
    }

    /// Current raw records for a user.
    #[must_use]
    pub fn records(&self, user: &UserId) -> BTreeMap<String, Value> {
        self.cart(user).borrow().clone()
    }

    /// Fail the next `n` reads.
    pub fn fail_next_reads(&self, n: u32) {
        self.faults().reads = n;
    }

    /// Fail the next `n` writes (puts and deletes).
    pub fn fail_next_writes(&self, n: u32) {
        self.faults().writes = n;
    }

    /// Fail the next `n` subscription attempts with a connection error.
    pub fn fail_next_subscribes(&self, n: u32) {
        self.faults().subscribes = n;
    }

    /// Hold every put and delete until [`resume_writes`](Self::resume_writes).
    pub fn pause_writes(&self) {
        self.inner.writes_paused.send_replace(true);
    }

    /// Release held writes.
    pub fn resume_writes(&self) {
        self.inner.writes_paused.send_replace(false);
    }

    /// Terminate every live subscription with a connection error.
    pub fn disconnect_all(&self) {
        self.inner.disconnects.send_modify(|generation| *generation += 1);
    }

    /// Number of store operations attempted, subscriptions included.
    #[must_use]
    pub fn operation_count(&self) -> u64 {
        self.inner.operations.load(Ordering::SeqCst)
    }

    fn cart(&self, user: &UserId) -> watch::Sender<Records> {
        let mut carts = self
            .inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        carts
            .entry(user.clone())
            .or_insert_with(|| watch::channel(Records::new()).0)
            .clone()
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self, kind: FaultKind) -> Result<(), StoreError> {
        self.inner.operations.fetch_add(1, Ordering::SeqCst);

        let mut faults = self.faults();
        let remaining = match kind {
            FaultKind::Read => &mut faults.reads,
            FaultKind::Write => &mut faults.writes,
            FaultKind::Subscribe => &mut faults.subscribes,
        };
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;

        Err(match kind {
            FaultKind::Subscribe => StoreError::Connection("injected connection failure".into()),
            FaultKind::Read => StoreError::Injected("read".into()),
            FaultKind::Write => StoreError::Injected("write".into()),
        })
    }

    async fn wait_for_writes(&self) {
        let mut paused = self.inner.writes_paused.subscribe();
        // The sender lives as long as the store, so this only ends once unpaused.
        let _ = paused.wait_for(|paused| !*paused).await;
    }
}

impl CartStore for MemoryCartStore {
    async fn subscribe(&self, user: &UserId) -> Result<SnapshotStream, StoreError> {
        self.check_fault(FaultKind::Subscribe)?;

        let mut records = self.cart(user).subscribe();
        let mut disconnects = self.inner.disconnects.subscribe();
        debug!(user = %user, "memory subscription opened");

        Ok(Box::pin(stream! {
            let initial = records.borrow_and_update().clone();
            yield Ok(CartSnapshot::new(initial));

            loop {
                let event = tokio::select! {
                    changed = records.changed() => match changed {
                        Ok(()) => {
                            let latest = records.borrow_and_update().clone();
                            Some(Ok(CartSnapshot::new(latest)))
                        }
                        Err(_) => None,
                    },
                    _ = disconnects.changed() => {
                        Some(Err(StoreError::Connection("subscription dropped".into())))
                    }
                };

                match event {
                    Some(Ok(snapshot)) => yield Ok(snapshot),
                    Some(Err(e)) => {
                        yield Err(e);
                        break;
                    }
                    None => break,
                }
            }
        }))
    }

    async fn get(&self, user: &UserId, product: &ProductId) -> Result<Option<Value>, StoreError> {
        self.check_fault(FaultKind::Read)?;
        Ok(self.cart(user).borrow().get(product.as_str()).cloned())
    }

    async fn put(&self, user: &UserId, product: &ProductId, record: Value) -> Result<(), StoreError> {
        self.wait_for_writes().await;
        self.check_fault(FaultKind::Write)?;

        let key = product.to_string();
        self.cart(user).send_modify(|records| {
            records.insert(key, record);
        });
        Ok(())
    }

    async fn delete(&self, user: &UserId, product: &ProductId) -> Result<(), StoreError> {
        self.wait_for_writes().await;
        self.check_fault(FaultKind::Write)?;

        self.cart(user)
            .send_if_modified(|records| records.remove(product.as_str()).is_some());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;

    fn user() -> UserId {
        UserId::new("user-1")
    }

    #[tokio::test]
    async fn test_subscribe_yields_initial_empty_snapshot() {
        let store = MemoryCartStore::new();
        let mut stream = store.subscribe(&user()).await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(first.is_empty());
    }

    #[tokio::test]
    async fn test_put_is_delivered_as_full_snapshot() {
        let store = MemoryCartStore::new();
        store.insert_raw(&user(), "1", json!({"id": 1}));
        let mut stream = store.subscribe(&user()).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 1);

        store
            .put(&user(), &ProductId::new("2"), json!({"id": 2}))
            .await
            .unwrap();

        let next = stream.next().await.unwrap().unwrap();
        assert_eq!(next.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_absent_succeeds() {
        let store = MemoryCartStore::new();
        store.delete(&user(), &ProductId::new("9")).await.unwrap();
        assert!(store.records(&user()).is_empty());
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed() {
        let store = MemoryCartStore::new();
        store.fail_next_reads(1);

        assert!(store.get(&user(), &ProductId::new("1")).await.is_err());
        assert!(store.get(&user(), &ProductId::new("1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_ends_stream_with_connection_error() {
        let store = MemoryCartStore::new();
        let mut stream = store.subscribe(&user()).await.unwrap();
        stream.next().await.unwrap().unwrap();

        store.disconnect_all();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_a_connection_error() {
        let store = MemoryCartStore::new();
        store.fail_next_subscribes(1);

        let result = store.subscribe(&user()).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }
}
