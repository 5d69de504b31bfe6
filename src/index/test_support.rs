use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::config::IndexConfig;
use crate::error::StoreError;
use crate::index::Index;
use crate::storage::{BatchOp, EntryStream, KvStore, MemoryStore, ScanRange, StoreResult};

pub async fn seed(store: &MemoryStore, entries: &[(&str, Value)]) {
    let ops = entries
        .iter()
        .map(|(k, v)| BatchOp::Put {
            key: k.to_string(),
            value: serde_json::to_vec(v).unwrap(),
        })
        .collect();
    store.batch(ops).await.unwrap();
}

pub async fn open_with(entries: &[(&str, Value)]) -> (Index<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    seed(&store, entries).await;
    (Index::open(store.clone(), IndexConfig::default()), store)
}

/// 统计扫描流实际被拉取了多少条
#[derive(Clone, Default)]
pub struct CountingStore {
    pub inner: MemoryStore,
    pub pulled: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }
}

impl KvStore for CountingStore {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        self.inner.get(key)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> impl Future<Output = StoreResult<()>> + Send {
        self.inner.batch(ops)
    }

    fn scan(&self, range: ScanRange) -> EntryStream {
        let pulled = self.pulled.clone();
        self.inner
            .scan(range)
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

/// 每次扫描先正常产出 `fail_after` 条，随后返回一个存储错误
#[derive(Clone, Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_after: usize,
}

impl FailingStore {
    pub fn new(fail_after: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_after,
        }
    }
}

impl KvStore for FailingStore {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        self.inner.get(key)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> impl Future<Output = StoreResult<()>> + Send {
        self.inner.batch(ops)
    }

    fn scan(&self, range: ScanRange) -> EntryStream {
        let fail_after = self.fail_after;
        self.inner
            .scan(range)
            .take(fail_after)
            .chain(stream::once(async move {
                Err(StoreError::Backend(format!("scan failed after {fail_after} entries")))
            }))
            .boxed()
    }
}
