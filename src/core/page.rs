use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IndexError, Result};

/// 时间戳后缀宽度：毫秒时间戳左补零到 13 位，字典序即时间序。
pub const TIMESTAMP_WIDTH: usize = 13;

/// `page/<pageId>` 下存储的页面记录
///
/// `visits` / `bookmarks` 保存完整 key（`visit/<ts>`），BTreeSet 的末元素即最近一次。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub visits: BTreeSet<String>,
    #[serde(default)]
    pub bookmarks: BTreeSet<String>,
    /// 仅由 augment_latest 填充，不落盘
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PageRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn is_bookmarked(&self) -> bool {
        !self.bookmarks.is_empty()
    }
}

/// 采集层交给索引的一次访问
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageCapture {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// 毫秒时间戳
    pub timestamp: u64,
    /// 附加到 `visit/<ts>` 记录上的元数据（停留时长、滚动深度等）
    #[serde(default)]
    pub meta: Map<String, Value>,
}

/// URL → (pageId, domain)
///
/// pageId 去掉 scheme、`www.`、fragment 与末尾 `/`，保留 query。
pub fn page_identity(raw_url: &str) -> Result<(String, String)> {
    let parsed = url::Url::parse(raw_url.trim())
        .map_err(|e| IndexError::InvalidCapture(format!("{raw_url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| IndexError::InvalidCapture(format!("{raw_url}: missing host")))?
        .to_lowercase();
    let domain = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut id = domain.clone();
    id.push_str(parsed.path().trim_end_matches('/'));
    if let Some(q) = parsed.query().filter(|q| !q.is_empty()) {
        id.push('?');
        id.push_str(q);
    }
    Ok((id, domain))
}

pub fn timestamp_suffix(ts_millis: u64) -> String {
    format!("{:0width$}", ts_millis, width = TIMESTAMP_WIDTH)
}
