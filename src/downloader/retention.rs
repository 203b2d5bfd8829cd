use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::TaskStore;

/// 删除重试之间的等待策略
pub trait DelayStrategy: Send + Sync {
    /// 第 `attempt` 次失败后的等待时间（从 1 开始）
    fn delay(&self, attempt: u32) -> Duration;
}

/// 线性退避：base × attempt
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub base: Duration,
}

impl DelayStrategy for LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayStrategy for NoDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// 删除单个文件的操作
#[async_trait]
pub trait FileRemover: Send + Sync {
    async fn remove(&self, path: &Path) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsRemover;

#[async_trait]
impl FileRemover for FsRemover {
    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 交付完成后删除产物文件和任务记录
#[derive(Clone)]
pub struct RetentionManager {
    store: TaskStore,
    attempts: u32,
    delay: Arc<dyn DelayStrategy>,
    remover: Arc<dyn FileRemover>,
    cancel: CancellationToken,
}

impl RetentionManager {
    pub fn new(store: TaskStore, attempts: u32, delay: Arc<dyn DelayStrategy>) -> Self {
        Self {
            store,
            attempts: attempts.max(1),
            delay,
            remover: Arc::new(FsRemover),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_remover(mut self, remover: Arc<dyn FileRemover>) -> Self {
        self.remover = remover;
        self
    }

    /// 取消后剩余的重试等待立即结束，不再重试
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn cleanup(&self, paths: &[PathBuf], task_id: &str) -> CleanupReport {
        let mut report = CleanupReport::default();
        for path in paths {
            match self.remove_with_retry(path).await {
                Ok(()) => report.removed.push(path.clone()),
                Err(reason) => {
                    warn!("⚠️ 文件删除失败: {} ({})", path.display(), reason);
                    report.failed.push((path.clone(), reason));
                }
            }
        }

        // 无论文件是否删除成功都移除任务记录
        self.store.delete(task_id);
        info!(
            "🧹 任务 {} 清理完成: 删除 {} 个文件, 失败 {} 个",
            task_id,
            report.removed.len(),
            report.failed.len()
        );
        report
    }

    async fn remove_with_retry(&self, path: &Path) -> Result<(), String> {
        let mut attempt = 1;
        loop {
            match self.remover.remove(path).await {
                Ok(()) => {
                    debug!("🗑️ 已删除文件: {}", path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                Err(e) if is_transient(&e) && attempt < self.attempts => {
                    let wait = self.delay.delay(attempt);
                    debug!(
                        "文件被占用，{:?} 后重试 ({}/{}): {}",
                        wait,
                        attempt,
                        self.attempts,
                        path.display()
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(format!("清理已取消: {}", e)),
                        _ = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e.to_string()),
            }
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::ResourceBusy)
}
