use thiserror::Error;

/// 存储层错误（key 不存在不是错误，由 `get -> Option` 表达）
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store closed")]
    Closed,

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Page not found: {page_id}")]
    NotFound { page_id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Write queue closed")]
    WriterClosed,

    #[error("Queued write aborted: {0}")]
    WriteAborted(String),

    #[error("Invalid capture: {0}")]
    InvalidCapture(String),
}

impl IndexError {
    pub fn not_found(page_id: impl Into<String>) -> Self {
        IndexError::NotFound {
            page_id: page_id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
