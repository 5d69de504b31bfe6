use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::core::{decode, encode, Namespace, PageRecord};
use crate::error::Result;
use crate::index::{augment_latest, boost_scores, fold_token, Activity, Fetched, Index, PageScores};
use crate::storage::{KvStore, ScanRange};

/// 参与全文匹配的字段
const SEARCHABLE: [Namespace; 4] = [
    Namespace::Term,
    Namespace::Title,
    Namespace::Url,
    Namespace::Domain,
];

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// 空白分隔的关键词；为空时按最近活动列出
    pub text: String,
    /// None 使用配置的 default_search_limit
    pub limit: Option<usize>,
    pub bookmarks_only: bool,
    pub domain: Option<String>,
    pub tags: Vec<String>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn bookmarks_only(mut self) -> Self {
        self.bookmarks_only = true;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    fn tokens(&self) -> BTreeSet<String> {
        self.text
            .split_whitespace()
            .map(fold_token)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchResult {
    pub id: String,
    /// 附加了 `latest` 的页面记录
    pub document: PageRecord,
    /// 1，收藏页被加权时为 `1 + bookmark_boost`
    pub score: f64,
}

fn posting_ids(value: Option<serde_json::Value>) -> Result<BTreeSet<String>> {
    match value {
        Some(v) => Ok(serde_json::from_value(v)?),
        None => Ok(BTreeSet::new()),
    }
}

fn numeric(latest: &str) -> f64 {
    latest.trim().parse().unwrap_or(0.0)
}

impl<S: KvStore> Index<S> {
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let limit = query.limit.unwrap_or(self.config().default_search_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let filter = self.filter_set(query).await?;
        let tokens = query.tokens();

        let candidates: PageScores = if tokens.is_empty() {
            let ns = if query.bookmarks_only {
                Namespace::Bookmark
            } else {
                Namespace::Visit
            };
            // 有过滤条件时不能在扫描阶段截断
            let cap = filter.is_none().then_some(limit);
            let mut recent = self
                .reverse_range_lookup(ScanRange::namespace(ns), cap)
                .await?;
            if let Some(allowed) = &filter {
                recent.retain(|id, _| allowed.contains(id));
            }
            recent
        } else {
            let mut ids = self.match_tokens(&tokens).await?;
            if let Some(allowed) = &filter {
                ids.retain(|id| allowed.contains(id));
            }
            ids.into_iter().map(|id| (id, Activity::default())).collect()
        };

        tracing::debug!(
            "Search {:?}: {} tokens, {} candidates",
            query.text,
            tokens.len(),
            candidates.len()
        );
        self.rank(candidates, query.bookmarks_only, limit).await
    }

    /// 每个 token 在任一字段的 posting 里命中即算匹配；结果为各 token 匹配集合的交集
    async fn match_tokens(&self, tokens: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let lookups = SEARCHABLE.map(|ns| {
            let keys: BTreeSet<String> = tokens.iter().map(|t| encode(ns, t)).collect();
            async move { self.term_range_lookup(ns, &keys).await }
        });

        let mut per_token: BTreeMap<String, BTreeSet<String>> = tokens
            .iter()
            .map(|t| (t.clone(), BTreeSet::new()))
            .collect();
        for hits in try_join_all(lookups).await? {
            for (key, value) in hits {
                let ids = posting_ids(value)?;
                if let Some(slot) = per_token.get_mut(decode(&key)) {
                    slot.extend(ids);
                }
            }
        }

        let mut sets = per_token.into_values();
        let first = sets.next().unwrap_or_default();
        Ok(sets.fold(first, |acc, s| acc.intersection(&s).cloned().collect()))
    }

    /// domain / tag 过滤条件对应的 pageId 集合；无过滤条件时为 None
    async fn filter_set(&self, query: &SearchQuery) -> Result<Option<BTreeSet<String>>> {
        let mut keys = Vec::new();
        if let Some(domain) = &query.domain {
            let folded = fold_token(domain);
            let domain = folded.strip_prefix("www.").unwrap_or(&folded);
            if !domain.is_empty() {
                keys.push(encode(Namespace::Domain, domain));
            }
        }
        for tag in &query.tags {
            let tag = fold_token(tag);
            if !tag.is_empty() {
                keys.push(encode(Namespace::Tag, &tag));
            }
        }
        if keys.is_empty() {
            return Ok(None);
        }

        let fetched = self.lookup_by_keys(keys, &self.lookup_options()).await?;
        let mut allowed: Option<BTreeSet<String>> = None;
        for value in fetched.into_values() {
            let ids = posting_ids(value.into_json())?;
            allowed = Some(match allowed {
                None => ids,
                Some(prev) => prev.intersection(&ids).cloned().collect(),
            });
        }
        Ok(allowed)
    }

    async fn rank(
        &self,
        candidates: PageScores,
        bookmarks_only: bool,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let keys: Vec<String> = candidates
            .keys()
            .map(|id| encode(Namespace::Page, id))
            .collect();
        let mut fetched = self.lookup_by_keys(keys, &self.lookup_options()).await?;

        let mut docs = Vec::with_capacity(candidates.len());
        let mut bookmarked = PageScores::new();
        for (id, activity) in candidates {
            let value = match fetched.remove(&encode(Namespace::Page, &id)) {
                Some(Fetched::Json(v)) => v,
                _ => {
                    tracing::debug!("Posting references missing page {}", id);
                    continue;
                }
            };
            let doc = augment_latest(&serde_json::from_value::<PageRecord>(value)?);
            if bookmarks_only && !doc.is_bookmarked() {
                continue;
            }
            let latest = if activity.latest.is_empty() {
                doc.latest.clone().unwrap_or_default()
            } else {
                activity.latest
            };
            if doc.is_bookmarked() {
                bookmarked.insert(id.clone(), Activity::new(latest.clone()));
            }
            docs.push((id, doc, latest));
        }

        let boost = self.config().bookmark_boost;
        let boosted = boost_scores(bookmarked, boost);

        let mut results: Vec<(f64, SearchResult)> = docs
            .into_iter()
            .map(|(id, document, latest)| {
                let (rank, score) = match boosted.get(&id) {
                    Some(a) if boost != 0.0 => (numeric(&a.latest), 1.0 + boost),
                    _ => (numeric(&latest), 1.0),
                };
                (rank, SearchResult { id, document, score })
            })
            .collect();

        results.sort_by(|(ra, a), (rb, b)| {
            rb.partial_cmp(ra)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(limit);
        Ok(results.into_iter().map(|(_, r)| r).collect())
    }
}
