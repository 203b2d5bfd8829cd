use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::trace;

use super::models::TaskUpdate;
use super::store::TaskStore;

/// 下载流水线发出的进度事件
///
/// `percent` 为 None 表示进度不确定（服务器未返回内容长度），只更新提示信息。
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub percent: Option<u8>,
    pub message: String,
}

/// 进度事件的发送端，映射到整体进度中的一段区间 [start, end]
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: UnboundedSender<ProgressEvent>,
    start: u8,
    end: u8,
}

impl ProgressReporter {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx, start: 0, end: 100 }
    }

    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// 子区间，取值相对于整体进度
    pub fn window(&self, start: u8, end: u8) -> Self {
        let start = start.min(100);
        Self {
            tx: self.tx.clone(),
            start,
            end: end.clamp(start, 100),
        }
    }

    pub fn stage(&self, percent: u8, message: impl Into<String>) {
        self.send(Some(percent.min(100)), message.into());
    }

    pub fn message(&self, message: impl Into<String>) {
        self.send(None, message.into());
    }

    /// 字节级进度：total 为 0 时按进度不确定处理
    pub fn transfer(&self, downloaded: u64, total: u64) {
        if total == 0 {
            self.send(None, format!("已下载: {}", format_bytes(downloaded)));
            return;
        }
        let ratio = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
        let span = f64::from(self.end - self.start);
        let percent = self.start + (ratio * span).floor() as u8;
        self.send(Some(percent), format!("下载进度: {:.1}%", ratio * 100.0));
    }

    fn send(&self, percent: Option<u8>, message: String) {
        // 接收端已经退出时丢弃事件
        let _ = self.tx.send(ProgressEvent { percent, message });
    }
}

/// 启动订阅者：把进度事件写入任务表，发送端全部释放后退出
///
/// 积压的事件会被合并成一次更新。
pub fn spawn_subscriber(
    store: TaskStore,
    task_id: String,
    mut rx: UnboundedReceiver<ProgressEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut percent = first.percent;
            let mut message = first.message;
            while let Ok(next) = rx.try_recv() {
                percent = match (percent, next.percent) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                message = next.message;
            }

            trace!("任务 {} 进度: {:?} {}", task_id, percent, message);
            let update = TaskUpdate {
                progress: percent,
                message: Some(message),
                ..Default::default()
            };
            if !store.update(&task_id, update) {
                // 任务已被删除或已结束
                break;
            }
        }
    })
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}
