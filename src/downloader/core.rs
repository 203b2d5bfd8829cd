use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::progress::ProgressReporter;
use crate::common::api::error::ApiError;
use crate::common::client::client::BiliClient;
use crate::common::config::DEFAULT_CHUNK_SIZE;

/// 把一个远程流写入本地文件
#[derive(Debug, Clone)]
pub struct StreamFetcher {
    client: BiliClient,
    chunk_size: usize,
}

impl StreamFetcher {
    pub fn new(client: BiliClient, chunk_size: usize) -> Self {
        Self {
            client,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn with_default_chunk(client: BiliClient) -> Self {
        Self::new(client, DEFAULT_CHUNK_SIZE)
    }

    /// 流式下载到 `dest`，返回写入的字节数
    ///
    /// 网络错误时保留已写入的部分文件，由调用方决定是否清理；
    /// 取消或 future 被丢弃时部分文件会被删除。
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let mut guard = PartialFileGuard::new(dest);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled),
            result = self.transfer(url, dest, progress) => result,
        };

        match result {
            Ok(written) => {
                guard.keep();
                Ok(written)
            }
            Err(DownloadError::Cancelled) => {
                // guard 在离开作用域时删除部分文件
                info!("⏹️ 下载已取消，删除部分文件: {}", dest.display());
                drop(guard);
                Err(DownloadError::Cancelled)
            }
            Err(e) => {
                guard.keep();
                Err(e)
            }
        }
    }

    /// 依次尝试主地址和备用地址，每次失败都删除部分文件；取消不会重试
    pub async fn fetch_with_backups(
        &self,
        urls: &[String],
        dest: &Path,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<u64, DownloadError> {
        let mut last_error = DownloadError::StreamError("没有可用的下载地址".to_string());
        for (attempt, url) in urls.iter().enumerate() {
            if attempt > 0 {
                warn!("🔁 尝试备用地址 ({}/{})", attempt, urls.len() - 1);
            }
            match self.fetch(url, dest, progress, cancel).await {
                Ok(written) => return Ok(written),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("❌ 下载失败: {}", e);
                    remove_partial(dest).await;
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn transfer(
        &self,
        url: &str,
        dest: &Path,
        progress: &ProgressReporter,
    ) -> Result<u64, DownloadError> {
        let response = self.client.get_stream_response(url).await?;
        BiliClient::check_status(&response, url).map_err(|e| match e {
            ApiError::Status { status, url } => DownloadError::Status { status, url },
            other => DownloadError::Api(other),
        })?;

        let total_size = response.content_length().unwrap_or(0);
        debug!("开始下载二进制文件: {} ({} 字节)", url, total_size);

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();

        let mut downloaded = 0u64;
        progress.transfer(0, total_size);
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            for piece in chunk.chunks(self.chunk_size) {
                file.write_all(piece).await?;
                downloaded += piece.len() as u64;
                progress.transfer(downloaded, total_size);
            }
        }
        file.flush().await?;

        if total_size > 0 && downloaded < total_size {
            return Err(DownloadError::StreamError(format!(
                "连接提前关闭: 已下载 {} / {} 字节",
                downloaded, total_size
            )));
        }

        debug!("✅ 下载完成: {} ({} 字节)", dest.display(), downloaded);
        Ok(downloaded)
    }
}

pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("🗑️ 已删除部分文件: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("删除部分文件失败: {} ({})", path.display(), e),
    }
}

// 未确认完成的目标文件在 drop 时删除
struct PartialFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartialFileGuard {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            armed: true,
        }
    }

    fn keep(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFileGuard {
    fn drop(&mut self) {
        if self.armed {
            match std::fs::remove_file(&self.path) {
                Ok(()) => debug!("🗑️ 已删除部分文件: {}", self.path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("删除部分文件失败: {} ({})", self.path.display(), e),
            }
        }
    }
}
