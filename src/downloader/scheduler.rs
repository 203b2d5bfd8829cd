use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::artifact::ArtifactLease;
use super::core::{StreamFetcher, remove_partial};
use super::error::{DownloadError, TaskError};
use super::models::{DownloadOptions, DownloadResult, MuxMethod, Task, TaskStatus, TaskUpdate};
use super::progress::{ProgressReporter, spawn_subscriber};
use super::retention::{LinearBackoff, RetentionManager};
use super::store::TaskStore;
use crate::common::client::client::BiliClient;
use crate::common::client::credential::Credential;
use crate::common::config::OrchestratorConfig;
use crate::parser::stream_selector::{OutputNaming, QualityOptions, QualitySelector};
use crate::parser::{BilibiliResolver, SourceResolver};
use crate::post_process::MediaMerger;

const CANCELLED_MESSAGE: &str = "任务已取消";

/// 下载任务调度器
///
/// 每个提交的任务在有界工作池中依次执行 解析 -> 选择 -> 下载视频 -> 下载音频 -> 合并，
/// 同一来源URL同时只允许存在一个未失败的任务。
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    store: TaskStore,
    resolver: Arc<dyn SourceResolver>,
    fetcher: StreamFetcher,
    merger: MediaMerger,
    retention: RetentionManager,
    credential: Option<Credential>,
    semaphore: Arc<Semaphore>, // 控制并发数
    cancels: DashMap<String, CancellationToken>,
    shutdown: CancellationToken,
}

// 流水线写入的中间文件，任务未成功结束时统一删除
#[derive(Clone, Default)]
struct ScratchFiles(Arc<Mutex<Vec<PathBuf>>>);

impl ScratchFiles {
    fn track(&self, paths: &[PathBuf]) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(paths);
    }

    fn take(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

type PipelineOutput = (DownloadResult, Option<MuxMethod>);

impl Scheduler {
    pub async fn new(
        config: OrchestratorConfig,
        resolver: Arc<dyn SourceResolver>,
    ) -> Result<Self, DownloadError> {
        let client = BiliClient::from_config(&config)?;
        Self::with_client(config, resolver, client).await
    }

    /// 使用哔哩哔哩页面解析器
    pub async fn bilibili(config: OrchestratorConfig) -> Result<Self, DownloadError> {
        let client = BiliClient::from_config(&config)?;
        let resolver = Arc::new(BilibiliResolver::new(client.clone()));
        Self::with_client(config, resolver, client).await
    }

    async fn with_client(
        config: OrchestratorConfig,
        resolver: Arc<dyn SourceResolver>,
        client: BiliClient,
    ) -> Result<Self, DownloadError> {
        let merger = MediaMerger::new(config.ffmpeg_path.clone());
        merger.probe().await;

        let credential = match &config.cookie_file {
            Some(path) => Credential::load(path).await,
            None => None,
        };
        if credential.is_some() {
            info!("🍪 已加载登录凭证");
        }

        let store = TaskStore::new();
        let shutdown = CancellationToken::new();
        let retention = RetentionManager::new(
            store.clone(),
            config.cleanup_attempts,
            Arc::new(LinearBackoff {
                base: config.cleanup_backoff,
            }),
        )
        .with_cancellation(shutdown.clone());

        info!(
            "🚀 调度器已启动: 下载目录 {:?}, 最大并发 {}",
            config.download_dir,
            config.pool_size()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                fetcher: StreamFetcher::new(client, config.chunk_size()),
                semaphore: Arc::new(Semaphore::new(config.pool_size())),
                config,
                store,
                resolver,
                merger,
                retention,
                credential,
                cancels: DashMap::new(),
                shutdown,
            }),
        })
    }

    pub fn store(&self) -> &TaskStore {
        &self.inner.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn merger(&self) -> &MediaMerger {
        &self.inner.merger
    }

    /// 提交下载任务，返回任务ID；同一URL已有未失败的任务时返回冲突
    pub fn submit(&self, url: &str, options: DownloadOptions) -> Result<String, TaskError> {
        let task_id = uuid::Uuid::new_v4().to_string();
        self.inner
            .store
            .create_exclusive(Task::new(&task_id, url, options))
            .inspect_err(|e| warn!("⚠️ {}", e))?;

        let cancel = self.inner.shutdown.child_token();
        self.inner.cancels.insert(task_id.clone(), cancel.clone());
        info!("📥 已提交下载任务: {} ({})", task_id, url);

        tokio::spawn(Inner::run_worker(
            Arc::clone(&self.inner),
            task_id.clone(),
            cancel,
        ));
        Ok(task_id)
    }

    pub fn status(&self, task_id: &str) -> Option<Task> {
        self.inner.store.get(task_id)
    }

    pub fn list(&self) -> Vec<Task> {
        self.inner.store.list_all()
    }

    /// 取消排队中或正在执行的任务
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.inner.cancels.get(task_id) {
            Some(token) => {
                info!("⏹️ 取消任务: {}", task_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消所有任务
    pub fn shutdown(&self) {
        info!("🛑 正在停止所有下载任务...");
        self.inner.shutdown.cancel();
    }

    /// 查询视频可选的画质和音质
    pub async fn quality_options(&self, url: &str) -> Result<QualityOptions, DownloadError> {
        let set = self
            .inner
            .resolver
            .resolve(url, self.inner.credential.as_ref())
            .await
            .ok_or(DownloadError::ResolveFailed)?;
        Ok(QualitySelector::describe(&set))
    }

    /// 认领已完成任务的产物，交付完成后调用 [`ArtifactLease::complete`] 清理
    pub fn retrieve(&self, task_id: &str) -> Result<ArtifactLease, TaskError> {
        let task = self.inner.store.claim(task_id)?;
        let Some(result) = task.result.clone() else {
            self.inner.store.release(task_id);
            return Err(TaskError::NotReady {
                task_id: task_id.to_string(),
                status: task.status,
            });
        };
        if let Some(missing) = result.paths().into_iter().find(|p| !p.exists()) {
            self.inner.store.release(task_id);
            warn!("⚠️ 任务 {} 的文件不存在: {:?}", task_id, missing);
            return Err(TaskError::ArtifactMissing(missing));
        }
        Ok(ArtifactLease::new(
            task,
            result,
            self.inner.store.clone(),
            self.inner.retention.clone(),
        ))
    }
}

impl Inner {
    async fn run_worker(self: Arc<Self>, task_id: String, cancel: CancellationToken) {
        // 超出工作池容量的任务在这里排队
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.semaphore).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            self.store.update(&task_id, cancelled_update());
            self.cancels.remove(&task_id);
            return;
        };

        let (reporter, rx) = ProgressReporter::channel();
        let subscriber = spawn_subscriber(self.store.clone(), task_id.clone(), rx);
        let scratch = ScratchFiles::default();

        let pipeline = tokio::spawn(Arc::clone(&self).pipeline(
            task_id.clone(),
            reporter,
            cancel.clone(),
            scratch.clone(),
        ));
        let outcome = pipeline.await;
        drop(permit);
        // 终态之前先写完所有进度事件
        let _ = subscriber.await;

        let update = match outcome {
            Ok(Ok((result, mux_method))) => {
                info!("✅ 下载任务完成: {}", task_id);
                let message = match mux_method {
                    Some(method) if method.is_degraded() => {
                        "下载完成（未找到 ffmpeg，已直接拼接，文件可能无法播放）"
                    }
                    _ => "下载完成",
                };
                TaskUpdate::completed(result, mux_method, message)
            }
            Ok(Err(e)) => {
                for path in scratch.take() {
                    remove_partial(&path).await;
                }
                if e.is_cancelled() {
                    info!("⏹️ 下载任务已取消: {}", task_id);
                    cancelled_update()
                } else {
                    error!("❌ 下载任务失败: {}, 错误: {}", task_id, e);
                    TaskUpdate::failed(e)
                }
            }
            Err(join_error) => {
                for path in scratch.take() {
                    remove_partial(&path).await;
                }
                error!("❌ 下载任务异常退出: {}, 错误: {}", task_id, join_error);
                TaskUpdate::failed(format!("任务异常退出: {}", join_error))
            }
        };

        self.store.update(&task_id, update);
        self.cancels.remove(&task_id);
    }

    async fn pipeline(
        self: Arc<Self>,
        task_id: String,
        reporter: ProgressReporter,
        cancel: CancellationToken,
        scratch: ScratchFiles,
    ) -> Result<PipelineOutput, DownloadError> {
        self.store.update(
            &task_id,
            TaskUpdate::status(TaskStatus::Downloading).with_message("开始下载..."),
        );
        // 记录已被删除时没有必要继续
        let task = self.store.get(&task_id).ok_or(DownloadError::Cancelled)?;
        let options = &task.options;

        reporter.stage(10, "正在解析视频信息...");
        let resolved = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            set = self.resolver.resolve(&task.url, self.credential.as_ref()) => set,
        };
        let set = resolved.ok_or(DownloadError::ResolveFailed)?;
        if !set.is_playable() {
            return Err(DownloadError::NoStreams);
        }

        let selection = QualitySelector::select(
            &set,
            options.video_quality_index,
            options.audio_quality_index,
        )
        .ok_or(DownloadError::NoStreams)?;
        reporter.stage(
            20,
            format!("已选择: {} / {}", selection.video_name(), selection.audio_name()),
        );

        let dir = &self.config.download_dir;
        tokio::fs::create_dir_all(dir).await?;
        let naming = OutputNaming::new(
            &task.url,
            options.filename.as_deref(),
            &task_id,
            &selection,
        );
        let (video_path, audio_path) = if options.merge {
            (naming.temp_video(dir), naming.temp_audio(dir))
        } else {
            (naming.split_video(dir), naming.split_audio(dir))
        };
        scratch.track(&[video_path.clone(), audio_path.clone()]);
        debug!("任务 {} 文件: {:?}, {:?}", task_id, video_path, audio_path);

        reporter.stage(30, format!("正在下载视频流 ({})...", selection.video_name()));
        let video_urls = urls_of(&selection.video.url, &selection.video.backup_urls);
        self.fetcher
            .fetch_with_backups(&video_urls, &video_path, &reporter.window(30, 60), &cancel)
            .await
            .map_err(|e| DownloadError::StageFailed("视频", Box::new(e)))?;

        let audio_end = if options.merge { 80 } else { 95 };
        reporter.stage(60, format!("正在下载音频流 ({})...", selection.audio_name()));
        let audio_urls = urls_of(&selection.audio.url, &selection.audio.backup_urls);
        self.fetcher
            .fetch_with_backups(&audio_urls, &audio_path, &reporter.window(60, audio_end), &cancel)
            .await
            .map_err(|e| DownloadError::StageFailed("音频", Box::new(e)))?;

        if !options.merge {
            return Ok((
                DownloadResult::Split {
                    video: video_path,
                    audio: audio_path,
                },
                None,
            ));
        }

        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        reporter.stage(80, "正在合并音视频...");
        let output = naming.merged_output(dir);
        let merged = self.merger.merge_av(&video_path, &audio_path, &output).await;
        // 无论合并是否成功都删除临时文件
        remove_partial(&video_path).await;
        remove_partial(&audio_path).await;
        let method = merged?;

        Ok((DownloadResult::Merged { path: output }, Some(method)))
    }
}

fn urls_of(primary: &str, backups: &[String]) -> Vec<String> {
    std::iter::once(primary.to_string())
        .chain(backups.iter().cloned())
        .filter(|u| !u.is_empty())
        .collect()
}

fn cancelled_update() -> TaskUpdate {
    TaskUpdate {
        status: Some(TaskStatus::Failed),
        message: Some(CANCELLED_MESSAGE.to_string()),
        error: Some(CANCELLED_MESSAGE.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_url_comes_first() {
        let urls = urls_of("a", &["b".to_string(), String::new(), "c".to_string()]);
        assert_eq!(urls, vec!["a", "b", "c"]);
    }

    #[test]
    fn cancelled_tasks_fail_with_fixed_message() {
        let update = cancelled_update();
        assert_eq!(update.status, Some(TaskStatus::Failed));
        assert_eq!(update.message.as_deref(), Some(CANCELLED_MESSAGE));
    }
}
