pub mod ingest;
pub mod lookup;
pub mod scan;
pub mod score;
pub mod terms;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::TryStreamExt;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::core::{decode, encode, Namespace, PageRecord};
use crate::error::{IndexError, Result};
use crate::storage::{KvStore, ScanRange};

pub use lookup::{Fetched, KeySet, LookupOptions};
pub use scan::{Activity, PageScores};
pub use score::boost_scores;
pub use terms::{extract_terms, fold_token, TermOptions};
pub use writer::WriteQueue;

/// 索引上下文：持有 store 句柄与唯一的写串行器。
///
/// 进程启动时构造一次，按引用（或廉价 clone）传给各组件；不存在全局实例。
pub struct Index<S: KvStore> {
    store: Arc<S>,
    writer: WriteQueue,
    config: Arc<IndexConfig>,
}

impl<S: KvStore> Clone for Index<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            writer: self.writer.clone(),
            config: self.config.clone(),
        }
    }
}

/// `grab_existing_keys` 的结果
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExistingKeys {
    pub history: BTreeSet<String>,
    pub bookmarks: BTreeSet<String>,
}

/// 只探测收藏集合是否非空，跳过页面其余字段的解码
#[derive(Deserialize)]
struct BookmarkProbe {
    #[serde(default)]
    bookmarks: Vec<IgnoredAny>,
}

impl<S: KvStore> Index<S> {
    /// 打开索引并启动写 worker（需在 tokio runtime 内调用）
    pub fn open(store: S, config: IndexConfig) -> Self {
        tracing::info!(
            "Opening index (lookup_concurrency={}, bookmark_boost={})",
            config.lookup_concurrency,
            config.bookmark_boost
        );
        Self {
            store: Arc::new(store),
            writer: WriteQueue::spawn(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// 索引唯一的写串行器。外部的写操作需经 [`WriteQueue::wrap`] 或 [`WriteQueue::run`] 提交。
    pub fn writer(&self) -> &WriteQueue {
        &self.writer
    }

    /// 等待所有已提交的写入落定
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 读取 `page/<pageId>`；不存在时返回携带 pageId 的 NotFound
    pub async fn fetch_existing_page(&self, page_id: &str) -> Result<PageRecord> {
        self.get_json::<PageRecord>(&encode(Namespace::Page, page_id))
            .await?
            .ok_or_else(|| IndexError::not_found(page_id))
    }

    /// 全量扫描 `page/`：所有页面进 history，收藏集合非空的再进 bookmarks
    pub async fn grab_existing_keys(&self, trim_namespace: bool) -> Result<ExistingKeys> {
        let mut out = ExistingKeys::default();
        let mut stream = self.store.scan(ScanRange::namespace(Namespace::Page));

        while let Some((key, bytes)) = stream.try_next().await? {
            let probe: BookmarkProbe = serde_json::from_slice(&bytes)?;
            let key = if trim_namespace {
                decode(&key).to_string()
            } else {
                key
            };
            if !probe.bookmarks.is_empty() {
                out.bookmarks.insert(key.clone());
            }
            out.history.insert(key);
        }
        Ok(out)
    }
}

/// 在浅拷贝上附加 `latest`（去掉命名空间前缀的时间戳）。
///
/// 只要访问集合非空就取访问集合的末元素，即使收藏集合里有更晚的时间戳；
/// 两者皆空时 `latest` 为 None。
pub fn augment_latest(doc: &PageRecord) -> PageRecord {
    let latest = doc
        .visits
        .last()
        .or_else(|| doc.bookmarks.last())
        .map(|k| decode(k).to_string());
    PageRecord {
        latest,
        ..doc.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::test_support::open_with;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn fetch_existing_page_reports_missing_id() {
        let (index, _) = open_with(&[]).await;
        let err = index.fetch_existing_page("missing").await.unwrap_err();
        assert!(matches!(err, IndexError::NotFound { ref page_id } if page_id == "missing"));
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn fetch_existing_page_returns_record() {
        let (index, _) = open_with(&[(
            "page/a",
            json!({"id": "a", "title": "Alpha", "visits": ["visit/0000000000001"]}),
        )])
        .await;
        let page = index.fetch_existing_page("a").await.unwrap();
        assert_eq!(page.title, "Alpha");
        assert_eq!(page.visits, set(&["visit/0000000000001"]));
    }

    #[tokio::test]
    async fn grab_existing_keys_splits_history_and_bookmarks() {
        let (index, _) = open_with(&[
            ("page/a", json!({"id": "a"})),
            (
                "page/b",
                json!({"id": "b", "bookmarks": ["bookmark/0000000000001", "bookmark/0000000000002"]}),
            ),
            ("term/a", json!(["a"])),
        ])
        .await;

        let keys = index.grab_existing_keys(true).await.unwrap();
        assert_eq!(keys.history, set(&["a", "b"]));
        assert_eq!(keys.bookmarks, set(&["b"]));

        let raw = index.grab_existing_keys(false).await.unwrap();
        assert_eq!(raw.history, set(&["page/a", "page/b"]));
        assert_eq!(raw.bookmarks, set(&["page/b"]));
    }

    #[tokio::test]
    async fn grab_existing_keys_propagates_store_errors() {
        let (index, store) = open_with(&[("page/a", json!({"id": "a"}))]).await;
        store.close();
        assert!(matches!(
            index.grab_existing_keys(true).await,
            Err(IndexError::Store(_))
        ));
    }

    #[tokio::test]
    async fn wrapped_external_writes_share_the_index_queue() {
        let (index, _) = open_with(&[]).await;
        let idx = index.clone();
        let count_visits = index.writer().wrap(move |id: String| {
            let idx = idx.clone();
            async move { idx.fetch_existing_page(&id).await.map(|p| p.visits.len()) }
        });

        let visit = index.record_visit(crate::core::PageCapture {
            url: "https://a.com/".into(),
            timestamp: 1,
            ..Default::default()
        });
        // 先入队的访问写入必然先完成
        let (visited, seen) = tokio::join!(visit, count_visits("a.com".to_string()));
        visited.unwrap();
        assert_eq!(seen.unwrap(), 1);
        assert_eq!(index.writer().completed(), 2);
    }

    #[test]
    fn augment_latest_prefers_visits_over_later_bookmarks() {
        let mut doc = PageRecord::new("a");
        doc.visits = set(&["visit/0000000000005", "visit/0000000000010"]);
        doc.bookmarks = set(&["bookmark/0000000000099"]);

        let out = augment_latest(&doc);
        assert_eq!(out.latest.as_deref(), Some("0000000000010"));
        // 原文档不变
        assert_eq!(doc.latest, None);
        assert_eq!(out.visits, doc.visits);
    }

    #[test]
    fn augment_latest_falls_back_to_bookmarks() {
        let mut doc = PageRecord::new("a");
        doc.bookmarks = set(&["bookmark/0000000000003", "bookmark/0000000000007"]);
        assert_eq!(
            augment_latest(&doc).latest.as_deref(),
            Some("0000000000007")
        );
        assert_eq!(augment_latest(&PageRecord::new("b")).latest, None);
    }
}
