use std::collections::HashMap;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;

use crate::error::{IndexError, Result};
use crate::index::Index;
use crate::storage::KvStore;

pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 5;

#[derive(Clone, Debug)]
pub struct LookupOptions {
    /// 同时在途的点查上限
    pub concurrency: usize,
    /// key 不存在时的替代值；None 表示返回显式的 Missing
    pub default_value: Option<Value>,
    /// 跳过 JSON 解码，直接返回存储字节
    pub raw_bytes: bool,
}

impl Default for LookupOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_LOOKUP_CONCURRENCY,
            default_value: None,
            raw_bytes: false,
        }
    }
}

impl LookupOptions {
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    pub fn with_default(mut self, v: Value) -> Self {
        self.default_value = Some(v);
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw_bytes = true;
        self
    }
}

/// 单个 key 的查找结果；不存在时是显式的 Missing，永远不会被静默省略
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched {
    Json(Value),
    Raw(Vec<u8>),
    Missing,
}

impl Fetched {
    pub fn is_missing(&self) -> bool {
        matches!(self, Fetched::Missing)
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Fetched::Json(v) => Some(v),
            Fetched::Raw(bytes) => serde_json::from_slice(&bytes).ok(),
            Fetched::Missing => None,
        }
    }
}

/// 单 key 或 key 集合
#[derive(Clone, Debug)]
pub enum KeySet {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for KeySet {
    fn from(k: &str) -> Self {
        KeySet::One(k.to_string())
    }
}

impl From<String> for KeySet {
    fn from(k: String) -> Self {
        KeySet::One(k)
    }
}

impl From<Vec<String>> for KeySet {
    fn from(keys: Vec<String>) -> Self {
        KeySet::Many(keys)
    }
}

impl From<&[&str]> for KeySet {
    fn from(keys: &[&str]) -> Self {
        KeySet::Many(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<S: KvStore> Index<S> {
    /// 按配置的并发度构造默认查找选项
    pub fn lookup_options(&self) -> LookupOptions {
        LookupOptions::default().with_concurrency(self.config.lookup_concurrency)
    }

    /// 点查；不存在时返回 `default_value`（或 Missing），其余存储错误原样上抛
    pub async fn single_lookup(&self, key: &str, opts: &LookupOptions) -> Result<Fetched> {
        match self.store.get(key).await? {
            Some(bytes) if opts.raw_bytes => Ok(Fetched::Raw(bytes)),
            Some(bytes) => Ok(Fetched::Json(serde_json::from_slice(&bytes)?)),
            None => Ok(opts
                .default_value
                .clone()
                .map(Fetched::Json)
                .unwrap_or(Fetched::Missing)),
        }
    }

    /// 批量点查：最多 `concurrency` 个并发，结果覆盖每个请求的 key
    pub async fn lookup_by_keys(
        &self,
        keys: impl Into<KeySet>,
        opts: &LookupOptions,
    ) -> Result<HashMap<String, Fetched>> {
        match keys.into() {
            KeySet::One(key) => {
                let v = self.single_lookup(&key, opts).await?;
                Ok(HashMap::from([(key, v)]))
            }
            KeySet::Many(keys) => {
                let concurrency = opts.concurrency.max(1);
                stream::iter(keys)
                    .map(move |key| async move {
                        let v = self.single_lookup(&key, opts).await?;
                        Ok::<_, IndexError>((key, v))
                    })
                    .buffer_unordered(concurrency)
                    .try_collect()
                    .await
            }
        }
    }
}
