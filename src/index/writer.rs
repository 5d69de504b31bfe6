use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};

use crate::error::{IndexError, Result};

type Job = BoxFuture<'static, ()>;

/// 写串行器：单一 FIFO 队列 + 单个 worker task。
///
/// ## 契约
/// - 任一时刻至多一个写操作在执行
/// - 完成顺序 = 入队顺序
/// - 单个任务失败（含 panic）只回传给它自己的调用方，不影响后续任务
///
/// 索引的所有写入都必须经过这里；除此之外不存在其它锁。
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Job>,
    completed: Arc<AtomicU64>,
}

impl WriteQueue {
    /// 启动 worker（需在 tokio runtime 内调用）
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            tracing::debug!("Write queue worker started");
            while let Some(job) = rx.recv().await {
                job.await;
            }
            tracing::debug!("Write queue worker stopped");
        });

        Self {
            tx,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 已执行完毕的任务数
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// 入队一个写任务并等待其完成。
    ///
    /// future 是惰性的：只有轮到它时 worker 才会开始 poll。
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel::<Result<T>>();
        let completed = self.completed.clone();

        let job = async move {
            let out = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(r) => r,
                Err(panic) => {
                    let msg = panic_message(panic.as_ref());
                    tracing::error!("Queued write panicked: {}", msg);
                    Err(IndexError::WriteAborted(msg))
                }
            };
            if let Err(e) = &out {
                tracing::warn!("Queued write failed: {}", e);
            }
            completed.fetch_add(1, Ordering::Relaxed);
            // 调用方可能已放弃等待，发送失败可忽略
            let _ = done_tx.send(out);
        }
        .boxed();

        self.tx.send(job).map_err(|_| IndexError::WriterClosed)?;
        done_rx.await.map_err(|_| IndexError::WriterClosed)?
    }

    /// 把一个写操作包装为串行化版本：`wrap(f)(arg)` 等价于 `run(f(arg))`。
    ///
    /// 索引外部的写操作通过 `index.writer().wrap(..)` 接入同一队列；
    /// 内置的 `record_*` 等方法直接调用 `run`。
    pub fn wrap<A, T, F, Fut>(&self, f: F) -> impl Fn(A) -> BoxFuture<'static, Result<T>> + Clone
    where
        A: Send + 'static,
        T: Send + 'static,
        F: Fn(A) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let queue = self.clone();
        move |arg| {
            let queue = queue.clone();
            let fut = f(arg);
            async move { queue.run(fut).await }.boxed()
        }
    }

    /// 等待此前入队的所有写任务完成
    pub async fn flush(&self) -> Result<()> {
        self.run(async { Ok(()) }).await
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
