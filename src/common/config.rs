use std::path::PathBuf;
use std::time::Duration;

/// 默认最大并发下载任务数
pub const DEFAULT_MAX_CONCURRENT: usize = 5;
/// 默认流式下载块大小
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

// 任务编排的运行配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub download_dir: PathBuf,
    pub max_concurrent: usize,
    pub cookie_file: Option<PathBuf>,
    pub ffmpeg_path: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub chunk_size: usize,
    pub cleanup_attempts: u32,
    pub cleanup_backoff: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cookie_file: Some(PathBuf::from("cookies.txt")),
            ffmpeg_path: ffmpeg_from_env(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
            cleanup_attempts: 3,
            cleanup_backoff: Duration::from_secs(1),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_cookie_file(mut self, cookie_file: Option<PathBuf>) -> Self {
        self.cookie_file = cookie_file;
        self
    }

    pub fn with_ffmpeg_path(mut self, ffmpeg_path: impl Into<String>) -> Self {
        self.ffmpeg_path = ffmpeg_path.into();
        self
    }

    pub fn with_cleanup_backoff(mut self, backoff: Duration) -> Self {
        self.cleanup_backoff = backoff;
        self
    }

    /// 工作池大小，至少为 1
    pub fn pool_size(&self) -> usize {
        self.max_concurrent.max(1)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}

// 获取 ffmpeg 路径（支持环境变量）
fn ffmpeg_from_env() -> String {
    std::env::var("FFMPEG_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| "ffmpeg".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_service_settings() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.pool_size(), 5);
        assert_eq!(config.chunk_size(), 8192);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.cleanup_attempts, 3);
    }

    #[test]
    fn pool_size_never_zero() {
        let config = OrchestratorConfig::default().with_max_concurrent(0);
        assert_eq!(config.pool_size(), 1);
    }
}
