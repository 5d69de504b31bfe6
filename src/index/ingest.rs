use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::core::{
    encode, normalize, page_identity, timestamp_suffix, Namespace, PageCapture, PageRecord,
    TimestampValue,
};
use crate::error::{IndexError, Result};
use crate::index::lookup::Fetched;
use crate::index::terms::{extract_terms, fold_token, url_tokens, TermOptions};
use crate::index::Index;
use crate::storage::{BatchOp, KvStore};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum PostingEdit {
    Add,
    Remove,
}

fn put_json<T: serde::Serialize>(key: String, value: &T) -> Result<BatchOp> {
    Ok(BatchOp::Put {
        key,
        value: serde_json::to_vec(value)?,
    })
}

fn title_keys(title: &str) -> BTreeSet<String> {
    extract_terms(title, &TermOptions::namespace(Namespace::Title))
        .into_iter()
        .collect()
}

impl<S: KvStore> Index<S> {
    /// 记录一次访问：创建/更新页面记录，写 `visit/<ts>`，并更新各字段倒排。
    pub async fn record_visit(&self, capture: PageCapture) -> Result<PageRecord> {
        let this = self.clone();
        self.writer
            .run(async move { this.apply_visit(capture).await })
            .await
    }

    /// 收藏已存在的页面
    pub async fn record_bookmark(&self, page_id: &str, timestamp: u64) -> Result<PageRecord> {
        let this = self.clone();
        let page_id = page_id.to_string();
        self.writer
            .run(async move { this.apply_bookmark(&page_id, timestamp).await })
            .await
    }

    /// 取消收藏：清空收藏集合并删除对应的 `bookmark/<ts>`
    pub async fn remove_bookmarks(&self, page_id: &str) -> Result<PageRecord> {
        let this = self.clone();
        let page_id = page_id.to_string();
        self.writer
            .run(async move { this.apply_unbookmark(&page_id).await })
            .await
    }

    pub async fn add_tag(&self, page_id: &str, tag: &str) -> Result<PageRecord> {
        let this = self.clone();
        let (page_id, tag) = (page_id.to_string(), tag.to_string());
        self.writer
            .run(async move { this.apply_tag(&page_id, &tag, PostingEdit::Add).await })
            .await
    }

    pub async fn remove_tag(&self, page_id: &str, tag: &str) -> Result<PageRecord> {
        let this = self.clone();
        let (page_id, tag) = (page_id.to_string(), tag.to_string());
        self.writer
            .run(async move { this.apply_tag(&page_id, &tag, PostingEdit::Remove).await })
            .await
    }

    async fn apply_visit(&self, capture: PageCapture) -> Result<PageRecord> {
        let (page_id, domain) = page_identity(&capture.url)?;
        let page_key = encode(Namespace::Page, &page_id);

        let existing = self.get_json::<PageRecord>(&page_key).await?;
        let is_new = existing.is_none();
        let mut page = existing.unwrap_or_else(|| PageRecord::new(page_id.clone()));

        let mut stale_title = BTreeSet::new();
        let new_title = capture.title.trim();
        if !new_title.is_empty() && new_title != page.title {
            stale_title = title_keys(&page.title);
            page.title = new_title.to_string();
        }
        page.url = capture.url.clone();
        page.domain = domain.clone();

        let visit_key = self
            .claim_timestamp_key(Namespace::Visit, capture.timestamp, &page_id)
            .await?;
        page.visits.insert(visit_key.clone());

        let mut added: BTreeSet<String> = extract_terms(&capture.content, &TermOptions::default())
            .into_iter()
            .collect();
        let fresh_title = title_keys(&page.title);
        added.extend(fresh_title.iter().cloned());
        added.extend(
            url_tokens(&page_id)
                .iter()
                .map(|t| encode(Namespace::Url, t)),
        );
        let domain_token = fold_token(&domain);
        if !domain_token.is_empty() {
            added.insert(encode(Namespace::Domain, &domain_token));
        }
        let removed: BTreeSet<String> = stale_title.difference(&fresh_title).cloned().collect();

        let mut ops = self.posting_ops(added, &page_id, PostingEdit::Add).await?;
        ops.extend(self.posting_ops(removed, &page_id, PostingEdit::Remove).await?);

        let record = TimestampValue::Structured {
            page_id: page_id.clone(),
            meta: capture.meta.clone(),
        };
        ops.push(put_json(visit_key, &record.to_json())?);
        ops.push(put_json(page_key, &page)?);

        tracing::debug!(
            "Indexing visit: page={} new={} mutations={}",
            page_id,
            is_new,
            ops.len()
        );
        self.store.batch(ops).await?;
        Ok(page)
    }

    async fn apply_bookmark(&self, page_id: &str, timestamp: u64) -> Result<PageRecord> {
        let mut page = self.fetch_existing_page(page_id).await?;
        let bookmark_key = self
            .claim_timestamp_key(Namespace::Bookmark, timestamp, page_id)
            .await?;
        page.bookmarks.insert(bookmark_key.clone());

        let record = TimestampValue::Structured {
            page_id: page_id.to_string(),
            meta: Map::new(),
        };
        let ops = vec![
            put_json(bookmark_key, &record.to_json())?,
            put_json(encode(Namespace::Page, page_id), &page)?,
        ];
        self.store.batch(ops).await?;
        Ok(page)
    }

    async fn apply_unbookmark(&self, page_id: &str) -> Result<PageRecord> {
        let mut page = self.fetch_existing_page(page_id).await?;
        let keys: Vec<String> = std::mem::take(&mut page.bookmarks).into_iter().collect();
        let records = self.lookup_by_keys(keys, &self.lookup_options()).await?;

        // 只删除仍属于本页面的记录
        let mut ops = Vec::with_capacity(records.len() + 1);
        for (key, fetched) in records {
            match fetched.into_json().as_ref().and_then(normalize) {
                Some(n) if n.page_id == page_id => ops.push(BatchOp::Delete { key }),
                Some(n) => tracing::warn!(
                    "Bookmark {} belongs to {}, not {}; leaving it",
                    key,
                    n.page_id,
                    page_id
                ),
                None => tracing::debug!("Bookmark {} already gone", key),
            }
        }
        ops.push(put_json(encode(Namespace::Page, page_id), &page)?);
        self.store.batch(ops).await?;
        Ok(page)
    }

    async fn apply_tag(&self, page_id: &str, tag: &str, edit: PostingEdit) -> Result<PageRecord> {
        let tag = fold_token(tag);
        if tag.is_empty() {
            return Err(IndexError::InvalidCapture("empty tag".to_string()));
        }
        let mut page = self.fetch_existing_page(page_id).await?;
        let changed = match edit {
            PostingEdit::Add => page.tags.insert(tag.clone()),
            PostingEdit::Remove => page.tags.remove(&tag),
        };
        if !changed {
            return Ok(page);
        }

        let keys = BTreeSet::from([encode(Namespace::Tag, &tag)]);
        let mut ops = self.posting_ops(keys, page_id, edit).await?;
        ops.push(put_json(encode(Namespace::Page, page_id), &page)?);
        self.store.batch(ops).await?;
        Ok(page)
    }

    /// 为 `<ns>/<ts>` 找一个可写的 key。
    ///
    /// 空位或已属于 `page_id` 时直接使用；被其它页面（或无法识别的值）占用时时间戳顺延 1ms。
    async fn claim_timestamp_key(
        &self,
        ns: Namespace,
        timestamp: u64,
        page_id: &str,
    ) -> Result<String> {
        let mut ts = timestamp;
        loop {
            let key = encode(ns, &timestamp_suffix(ts));
            let owner = match self.get_json::<Value>(&key).await? {
                None => return Ok(key),
                Some(v) => TimestampValue::classify(&v),
            };
            if owner.as_ref().is_some_and(|o| o.page_id() == page_id) {
                return Ok(key);
            }
            tracing::debug!("{} is taken, shifting {} by 1ms", key, page_id);
            ts = ts.checked_add(1).ok_or_else(|| {
                IndexError::InvalidCapture(format!("timestamp overflow from {timestamp}"))
            })?;
        }
    }

    /// 读取各 posting（并发批量点查），加入/移除 pageId，生成写操作；未变化的 posting 不写。
    async fn posting_ops(
        &self,
        keys: BTreeSet<String>,
        page_id: &str,
        edit: PostingEdit,
    ) -> Result<Vec<BatchOp>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let current = self
            .lookup_by_keys(keys.into_iter().collect::<Vec<_>>(), &self.lookup_options())
            .await?;

        let mut ops = Vec::new();
        for (key, fetched) in current {
            let mut ids: BTreeSet<String> = match fetched {
                Fetched::Json(v) => serde_json::from_value(v)?,
                _ => BTreeSet::new(),
            };
            let changed = match edit {
                PostingEdit::Add => ids.insert(page_id.to_string()),
                PostingEdit::Remove => ids.remove(page_id),
            };
            if !changed {
                continue;
            }
            if ids.is_empty() {
                ops.push(BatchOp::Delete { key });
            } else {
                ops.push(put_json(key, &ids)?);
            }
        }
        Ok(ops)
    }
}
