use std::collections::{BTreeMap, BTreeSet};

use futures::TryStreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{decode, normalize, Namespace};
use crate::error::Result;
use crate::index::Index;
use crate::storage::{KvStore, ScanRange};

const LATEST_FIELD: &str = "latest";

/// 某个页面最近一次活动：`latest` 为去前缀的时间戳，其余字段来自记录的 meta
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub latest: String,
    #[serde(flatten)]
    pub meta: Map<String, Value>,
}

impl Activity {
    pub fn new(latest: impl Into<String>) -> Self {
        Self {
            latest: latest.into(),
            meta: Map::new(),
        }
    }
}

/// pageId → 最近活动；迭代顺序即扫描顺序（逆序扫描时最近优先）
pub type PageScores = IndexMap<String, Activity>;

impl<S: KvStore> Index<S> {
    /// 在 `ns` 的前缀区间内扫描，只记录 `candidates` 中的 key。
    ///
    /// 返回的映射恰好覆盖 `candidates`：命中为 `Some(value)`，未命中为 `None`。
    pub async fn term_range_lookup(
        &self,
        ns: Namespace,
        candidates: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, Option<Value>>> {
        let mut out: BTreeMap<String, Option<Value>> =
            candidates.iter().map(|k| (k.clone(), None)).collect();

        let (Some(first), Some(last)) = (candidates.first(), candidates.last()) else {
            return Ok(out);
        };

        // 区间收窄到 [max(prefix, first), min(prefix+MAX, last)]，仍不越出前缀区间
        let (lo, hi) = ns.span();
        let gte = if first.as_str() > lo.as_str() {
            first.clone()
        } else {
            lo
        };
        let lte = if last.as_str() < hi.as_str() {
            last.clone()
        } else {
            hi
        };

        let mut stream = self.store.scan(ScanRange::between(gte, lte));
        while let Some((key, bytes)) = stream.try_next().await? {
            if let Some(slot) = out.get_mut(&key) {
                *slot = Some(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    /// 升序扫描 `range`，收集 去前缀 key → pageId（丢弃 meta）
    pub async fn range_lookup(&self, range: ScanRange) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        let mut stream = self.store.scan(range.forward());

        while let Some((key, bytes)) = stream.try_next().await? {
            let value: Value = serde_json::from_slice(&bytes)?;
            match normalize(&value) {
                Some(n) => {
                    out.insert(decode(&key).to_string(), n.page_id);
                }
                None => tracing::warn!("Skipping malformed timestamp record at {}", key),
            }
        }
        Ok(out)
    }

    /// 逆序扫描 `range`，每个 pageId 只保留第一次出现（即最近一次）。
    ///
    /// 收集到 `limit` 个不同 pageId 后立即停止拉取并丢弃扫描流。
    pub async fn reverse_range_lookup(
        &self,
        range: ScanRange,
        limit: Option<usize>,
    ) -> Result<PageScores> {
        let mut out = PageScores::new();
        if limit == Some(0) {
            return Ok(out);
        }

        let mut stream = self.store.scan(range.reversed());
        let mut scanned = 0usize;

        while let Some((key, bytes)) = stream.try_next().await? {
            scanned += 1;
            let value: Value = serde_json::from_slice(&bytes)?;
            let Some(n) = normalize(&value) else {
                tracing::warn!("Skipping malformed timestamp record at {}", key);
                continue;
            };
            if out.contains_key(&n.page_id) {
                continue;
            }
            let mut meta = n.meta;
            if meta.remove(LATEST_FIELD).is_some() {
                tracing::debug!("Dropping stored `latest` field from meta at {}", key);
            }
            out.insert(
                n.page_id,
                Activity {
                    latest: decode(&key).to_string(),
                    meta,
                },
            );
            if limit.is_some_and(|l| out.len() >= l) {
                tracing::debug!(
                    "Reverse scan reached limit {} after {} entries",
                    out.len(),
                    scanned
                );
                break;
            }
        }
        drop(stream);
        Ok(out)
    }

    /// 某命名空间内 key 数量
    pub async fn count_namespace(&self, ns: Namespace) -> Result<usize> {
        let n = self
            .store
            .scan(ScanRange::namespace(ns))
            .try_fold(0usize, |acc, _| async move { Ok(acc + 1) })
            .await?;
        Ok(n)
    }
}
