pub mod memory;
pub mod snapshot;

use std::future::Future;

use futures::stream::BoxStream;

use crate::core::Namespace;
use crate::error::StoreError;

pub use memory::MemoryStore;
pub use snapshot::SnapshotStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 一条存储记录：key + 原始值字节
pub type Entry = (String, Vec<u8>);

/// 有序扫描流：惰性、有限、不可重启；drop 即终止底层迭代。
pub type EntryStream = BoxStream<'static, StoreResult<Entry>>;

#[derive(Clone, Debug)]
pub enum BatchOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl BatchOp {
    pub fn key(&self) -> &str {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// 扫描区间（`gte` / `lte` 均为闭区间，缺省为无界）
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanRange {
    pub gte: Option<String>,
    pub lte: Option<String>,
    pub reverse: bool,
}

impl ScanRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(gte: impl Into<String>, lte: impl Into<String>) -> Self {
        Self {
            gte: Some(gte.into()),
            lte: Some(lte.into()),
            reverse: false,
        }
    }

    /// 整个命名空间：`[prefix, prefix + MAX_SORT_CHAR]`
    pub fn namespace(ns: Namespace) -> Self {
        let (lo, hi) = ns.span();
        Self::between(lo, hi)
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn forward(mut self) -> Self {
        self.reverse = false;
        self
    }
}

/// 索引所需的有序 KV 能力。
///
/// ## 契约
/// - `get` 对不存在的 key 返回 `Ok(None)`，其余失败一律 `Err`
/// - `batch` 整体生效或整体失败
/// - `scan` 按 key 字节序（`reverse` 时逆序）产出；不提供快照隔离
pub trait KvStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send;

    fn batch(&self, ops: Vec<BatchOp>) -> impl Future<Output = StoreResult<()>> + Send;

    fn scan(&self, range: ScanRange) -> EntryStream;

    fn put(
        &self,
        key: String,
        value: Vec<u8>,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        self.batch(vec![BatchOp::Put { key, value }])
    }
}

impl<S: KvStore> KvStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        (**self).get(key)
    }

    fn batch(&self, ops: Vec<BatchOp>) -> impl Future<Output = StoreResult<()>> + Send {
        (**self).batch(ops)
    }

    fn scan(&self, range: ScanRange) -> EntryStream {
        (**self).scan(range)
    }
}
