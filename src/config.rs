use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// 索引运行配置（TOML，所有字段均有默认值）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// 批量点查的最大并发
    pub lookup_concurrency: usize,

    /// 收藏页的 boost 系数（0 表示不加权）
    pub bookmark_boost: f64,

    /// 搜索默认返回条数
    pub default_search_limit: usize,

    /// 快照文件路径
    pub snapshot_path: PathBuf,

    /// 定期快照间隔（秒），0 关闭
    pub snapshot_interval_secs: u64,

    /// HTTP 查询端口
    pub http_port: u16,
}

fn default_snapshot_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hist-index")
        .join("index.db")
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            lookup_concurrency: 5,
            bookmark_boost: 0.0,
            default_search_limit: 100,
            snapshot_path: default_snapshot_path(),
            snapshot_interval_secs: 300,
            http_port: 6060,
        }
    }
}

impl IndexConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// 读取配置文件；文件不存在时回退默认值
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
