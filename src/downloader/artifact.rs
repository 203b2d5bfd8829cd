use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::{DownloadError, TaskError};
use super::models::{DownloadResult, Task};
use super::retention::{CleanupReport, RetentionManager};
use super::store::TaskStore;
use crate::post_process::MediaMerger;

/// 已完成任务产物的交付凭证
///
/// 同一任务同时只能存在一个凭证。调用 [`complete`](Self::complete) 后删除文件和任务记录；
/// 未完成就丢弃时释放认领，任务可以再次被获取。
pub struct ArtifactLease {
    task: Task,
    result: DownloadResult,
    cleanup_paths: Vec<PathBuf>,
    store: TaskStore,
    retention: RetentionManager,
    finished: bool,
}

impl ArtifactLease {
    pub(crate) fn new(
        task: Task,
        result: DownloadResult,
        store: TaskStore,
        retention: RetentionManager,
    ) -> Self {
        Self {
            cleanup_paths: result.paths(),
            task,
            result,
            store,
            retention,
            finished: false,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn result(&self) -> &DownloadResult {
        &self.result
    }

    /// 打开要交付的主文件：合并文件，或分离模式下的视频文件
    pub async fn open(&self) -> Result<tokio::fs::File, TaskError> {
        let path = self.result.primary();
        tokio::fs::File::open(path)
            .await
            .map_err(|_| TaskError::ArtifactMissing(path.to_path_buf()))
    }

    /// 把产物文件复制到 `dir`，返回复制后的路径
    pub async fn deliver_to(&self, dir: &Path) -> Result<Vec<PathBuf>, DownloadError> {
        tokio::fs::create_dir_all(dir).await?;
        let mut delivered = Vec::new();
        for source in self.result.paths() {
            let file_name = source
                .file_name()
                .ok_or_else(|| DownloadError::FileNotFound(source.clone()))?;
            let target = dir.join(file_name);
            if !source.exists() {
                return Err(DownloadError::FileNotFound(source));
            }
            tokio::fs::copy(&source, &target).await?;
            debug!("📦 已交付: {:?} -> {:?}", source, target);
            delivered.push(target);
        }
        Ok(delivered)
    }

    /// 把分离模式的音视频合并成一个文件，之后交付的是合并文件
    pub async fn merge_split(&mut self, merger: &MediaMerger) -> Result<PathBuf, TaskError> {
        let (video, audio) = match &self.result {
            DownloadResult::Merged { .. } => {
                return Err(TaskError::AlreadyMerged(self.task.id.clone()));
            }
            DownloadResult::Split { video, audio } => (video.clone(), audio.clone()),
        };

        let output = merged_name_for(&video);
        let method = merger
            .merge_av(&video, &audio, &output)
            .await
            .map_err(|e| TaskError::MergeFailed(e.to_string()))?;
        info!("✅ 任务 {} 已合并 ({:?}): {:?}", self.task.id, method, output);

        if !self.cleanup_paths.contains(&output) {
            self.cleanup_paths.push(output.clone());
        }
        self.result = DownloadResult::Merged {
            path: output.clone(),
        };
        Ok(output)
    }

    /// 交付完成：删除所有相关文件并移除任务记录
    pub async fn complete(mut self) -> CleanupReport {
        self.finished = true;
        self.retention
            .cleanup(&self.cleanup_paths, &self.task.id)
            .await
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        if !self.finished {
            debug!("交付未完成，释放任务: {}", self.task.id);
            self.store.release(&self.task.id);
        }
    }
}

// xxx_video.m4v -> xxx_merged.mp4
fn merged_name_for(video: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = stem.strip_suffix("_video").unwrap_or(&stem);
    video.with_file_name(format!("{}_merged.mp4", base))
}
