use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// 任务状态：Pending -> Downloading -> Completed | Failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    // 同一来源URL存在这些状态的任务时拒绝重复提交
    pub fn blocks_resubmit(self) -> bool {
        !matches!(self, TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Downloading => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    /// 状态只能向前推进，终态之间不能互相转换
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 提交下载时的选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    pub merge: bool,
    pub filename: Option<String>,
    pub video_quality_index: usize,
    pub audio_quality_index: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            merge: true,
            filename: None,
            video_quality_index: 0,
            audio_quality_index: 0,
        }
    }
}

/// 下载结果：合并模式一个文件，分离模式一对文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DownloadResult {
    Merged { path: PathBuf },
    Split { video: PathBuf, audio: PathBuf },
}

impl DownloadResult {
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            DownloadResult::Merged { path } => vec![path.clone()],
            DownloadResult::Split { video, audio } => vec![video.clone(), audio.clone()],
        }
    }

    // 直接交付给调用方的文件：合并文件，或分离模式下的视频文件
    pub fn primary(&self) -> &Path {
        match self {
            DownloadResult::Merged { path } => path,
            DownloadResult::Split { video, .. } => video,
        }
    }
}

/// 合并时实际使用的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuxMethod {
    /// 外部 ffmpeg 流复制
    Ffmpeg,
    /// 未找到 ffmpeg 时的直接拼接，输出文件不保证可播放
    Concat,
    /// 输出文件已存在，未重新合并
    Existing,
}

impl MuxMethod {
    pub fn is_degraded(self) -> bool {
        matches!(self, MuxMethod::Concat)
    }
}

/// 任务记录，只由 TaskStore 持有；对外提供的都是快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: String,
    pub url: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    pub options: DownloadOptions,
    pub result: Option<DownloadResult>,
    pub mux_method: Option<MuxMethod>,
    pub error: Option<String>,
    #[serde(skip)]
    pub(crate) claimed: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, url: impl Into<String>, options: DownloadOptions) -> Self {
        let now = Local::now();
        Self {
            id: id.into(),
            url: url.into(),
            status: TaskStatus::Pending,
            progress: 0,
            message: "任务已创建，等待开始下载...".to_string(),
            created_at: now,
            updated_at: now,
            options,
            result: None,
            mux_method: None,
            error: None,
            claimed: false,
        }
    }
}

/// 对任务的部分字段更新
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<DownloadResult>,
    pub mux_method: Option<MuxMethod>,
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn completed(result: DownloadResult, mux_method: Option<MuxMethod>, message: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Completed),
            progress: Some(100),
            message: Some(message.into()),
            result: Some(result),
            mux_method,
            error: None,
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        let error = error.to_string();
        Self {
            status: Some(TaskStatus::Failed),
            message: Some(format!("下载失败: {}", error)),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Downloading));
        assert!(Pending.can_transition_to(Failed));
        assert!(Downloading.can_transition_to(Completed));
        assert!(!Downloading.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn failed_tasks_allow_resubmit() {
        assert!(TaskStatus::Pending.blocks_resubmit());
        assert!(TaskStatus::Downloading.blocks_resubmit());
        assert!(TaskStatus::Completed.blocks_resubmit());
        assert!(!TaskStatus::Failed.blocks_resubmit());
    }

    #[test]
    fn split_result_delivers_video_first() {
        let result = DownloadResult::Split {
            video: PathBuf::from("a_video.m4v"),
            audio: PathBuf::from("a_audio.m4a"),
        };
        assert_eq!(result.primary(), Path::new("a_video.m4v"));
        assert_eq!(result.paths().len(), 2);
        assert_eq!(TaskStatus::Downloading.to_string(), "downloading");
    }
}
