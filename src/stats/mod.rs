use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::core::Namespace;
use crate::error::Result;
use crate::index::Index;
use crate::storage::KvStore;

/// key 空间统计：各命名空间的 key 数量（逐个扫描前缀区间得到）
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KeySpaceStats {
    /// 按 `Namespace::ALL` 顺序
    pub namespaces: IndexMap<String, usize>,
    pub total_keys: usize,
    /// 已完成的串行写入数
    pub writes_completed: u64,
}

impl KeySpaceStats {
    pub async fn collect<S: KvStore>(index: &Index<S>) -> Result<Self> {
        let mut stats = KeySpaceStats::default();
        for ns in Namespace::ALL {
            let n = index.count_namespace(ns).await?;
            stats.total_keys += n;
            stats.namespaces.insert(ns.as_str().to_string(), n);
        }
        stats.writes_completed = index.writer().completed();
        Ok(stats)
    }

    pub fn count(&self, ns: Namespace) -> usize {
        self.namespaces.get(ns.as_str()).copied().unwrap_or(0)
    }

    /// posting 类命名空间的 key 总数（不同 token 数）
    pub fn posting_keys(&self) -> usize {
        Namespace::POSTINGS.iter().map(|ns| self.count(*ns)).sum()
    }
}

impl fmt::Display for KeySpaceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           hist-index Key Space Report            ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        for (ns, n) in &self.namespaces {
            writeln!(f, "║   {:<14}{:>10}                       ║", format!("{ns}/"), n)?;
        }
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(
            f,
            "║   postings:     {:>10}                       ║",
            self.posting_keys()
        )?;
        writeln!(
            f,
            "║   total keys:   {:>10}                       ║",
            self.total_keys
        )?;
        writeln!(
            f,
            "║   writes:       {:>10}                       ║",
            self.writes_completed
        )?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
