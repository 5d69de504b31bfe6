use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::storage::{BatchOp, Entry, EntryStream, KvStore, ScanRange, StoreResult};

/// 内存有序 KV（BTreeMap 实现），可由 SnapshotStore 落盘。
///
/// 扫描是惰性游标：每次拉取都在读锁下从“上一条 key 之后”重新定位，
/// 因此不持有跨拉取的锁，也不提供快照隔离（并发写入可能被部分观察到）。
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let map = entries.into_iter().collect::<BTreeMap<_, _>>();
        Self {
            map: Arc::new(RwLock::new(map)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.map
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    /// 关闭后所有操作返回 `StoreError::Closed`
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("Memory store closed ({} keys)", self.len());
        }
    }

    fn check_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        let res = self
            .check_open()
            .map(|_| self.map.read().get(key).cloned());
        async move { res }
    }

    fn batch(&self, ops: Vec<BatchOp>) -> impl Future<Output = StoreResult<()>> + Send {
        let res = self.check_open().map(|_| {
            let mut g = self.map.write();
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => {
                        g.insert(key, value);
                    }
                    BatchOp::Delete { key } => {
                        g.remove(&key);
                    }
                }
            }
        });
        async move { res }
    }

    fn scan(&self, range: ScanRange) -> EntryStream {
        let map = self.map.clone();
        let closed = self.closed.clone();

        stream::unfold(
            (range, None::<String>, false),
            move |(range, cursor, done)| {
                let map = map.clone();
                let closed = closed.clone();
                async move {
                    if done {
                        return None;
                    }
                    if closed.load(Ordering::Acquire) {
                        // 报错后终止，不再继续拉取
                        return Some((Err(StoreError::Closed), (range, cursor, true)));
                    }
                    let next = {
                        let g = map.read();
                        next_after(&g, &range, cursor.as_deref())
                    };
                    let (k, v) = next?;
                    Some((Ok((k.clone(), v)), (range, Some(k), false)))
                }
            },
        )
        .boxed()
    }
}

/// 定位游标之后（逆序时为之前）的下一条记录
fn next_after(
    map: &BTreeMap<String, Vec<u8>>,
    range: &ScanRange,
    cursor: Option<&str>,
) -> Option<Entry> {
    let mut lo: Bound<&str> = match range.gte.as_deref() {
        Some(s) => Bound::Included(s),
        None => Bound::Unbounded,
    };
    let mut hi: Bound<&str> = match range.lte.as_deref() {
        Some(s) => Bound::Included(s),
        None => Bound::Unbounded,
    };
    if let Some(c) = cursor {
        if range.reverse {
            hi = Bound::Excluded(c);
        } else {
            lo = Bound::Excluded(c);
        }
    }
    if !well_formed(lo, hi) {
        return None;
    }

    let mut it = map.range::<str, _>((lo, hi));
    let hit = if range.reverse {
        it.next_back()
    } else {
        it.next()
    };
    hit.map(|(k, v)| (k.clone(), v.clone()))
}

/// BTreeMap::range 对倒置/空区间会 panic，先行拦截
fn well_formed(lo: Bound<&str>, hi: Bound<&str>) -> bool {
    use Bound::*;
    match (lo, hi) {
        (Included(a), Included(b)) => a <= b,
        (Included(a), Excluded(b)) | (Excluded(a), Included(b)) | (Excluded(a), Excluded(b)) => {
            a < b
        }
        _ => true,
    }
}
