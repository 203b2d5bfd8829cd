use std::path::PathBuf;

use thiserror::Error;

use super::models::TaskStatus;
use crate::common::api::error::ApiError;

/// 下载流水线中各阶段的错误
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP错误: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("IO错误: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("HTTP 请求失败，状态码: {status}，URL: {url}")]
    Status { status: u16, url: String },
    #[error("流传输失败: {0}")]
    StreamError(String),
    #[error("获取视频信息失败")]
    ResolveFailed,
    #[error("未找到可用的视频流或音频流")]
    NoStreams,
    #[error("{0}下载失败: {1}")]
    StageFailed(&'static str, Box<DownloadError>),
    #[error("下载已取消")]
    Cancelled,
    #[error("文件不存在: {0:?}")]
    FileNotFound(PathBuf),
    #[error("ffmpeg 执行失败: {0}")]
    FfmpegError(String),
    #[error("合并错误: {0}")]
    MergeError(String),
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            DownloadError::Cancelled => true,
            DownloadError::StageFailed(_, inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

/// 面向调用方的同步错误，与任务失败区分开
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("当前解析已经存在，请勿重复请求 (任务ID: {task_id}, 状态: {status})")]
    Conflict { task_id: String, status: TaskStatus },
    #[error("任务不存在: {0}")]
    NotFound(String),
    #[error("任务尚未完成: {task_id} ({status})")]
    NotReady { task_id: String, status: TaskStatus },
    #[error("文件不存在: {0:?}")]
    ArtifactMissing(PathBuf),
    #[error("任务文件正在被下载: {0}")]
    AlreadyClaimed(String),
    #[error("该任务已经是合并文件: {0}")]
    AlreadyMerged(String),
    #[error("合并失败: {0}")]
    MergeFailed(String),
}
