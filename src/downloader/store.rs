use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tracing::{debug, warn};

use super::error::TaskError;
use super::models::{Task, TaskStatus, TaskUpdate};

/// 任务表：task_id -> Task，所有读写都经过同一把锁
///
/// `get`/`list_all` 返回的是拷贝，修改快照不会影响存储的状态。
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Task>> {
        // 持锁期间不会 panic，中毒时数据仍然一致
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, task: Task) {
        debug!("创建任务: {} ({})", task.id, task.url);
        self.lock().insert(task.id.clone(), task);
    }

    /// 查重并创建：同一URL已有未失败的任务时返回冲突
    pub fn create_exclusive(&self, task: Task) -> Result<(), TaskError> {
        let mut tasks = self.lock();
        if let Some(existing) = tasks
            .values()
            .filter(|t| t.url == task.url && t.status.blocks_resubmit())
            .min_by_key(|t| t.created_at)
        {
            return Err(TaskError::Conflict {
                task_id: existing.id.clone(),
                status: existing.status,
            });
        }
        debug!("创建任务: {} ({})", task.id, task.url);
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    /// 部分更新；任务不存在或已处于终态时不做任何修改
    ///
    /// 进度只增不减；状态只能向前推进。返回是否应用了更新。
    pub fn update(&self, id: &str, update: TaskUpdate) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(id) else {
            debug!("任务 {} 不存在，忽略更新", id);
            return false;
        };
        if task.status.is_terminal() {
            debug!("任务 {} 已处于终态 {}，忽略更新", id, task.status);
            return false;
        }

        if let Some(status) = update.status {
            if task.status.can_transition_to(status) {
                task.status = status;
            } else {
                warn!("任务 {} 非法状态转换: {} -> {}", id, task.status, status);
            }
        }
        if let Some(progress) = update.progress {
            task.progress = task.progress.max(progress.min(100));
        }
        if let Some(message) = update.message {
            task.message = message;
        }
        if update.result.is_some() {
            task.result = update.result;
        }
        if update.mux_method.is_some() {
            task.mux_method = update.mux_method;
        }
        if update.error.is_some() {
            task.error = update.error;
        }
        task.updated_at = Local::now();
        true
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> Option<Task> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            debug!("删除任务记录: {}", id);
        }
        removed
    }

    /// 所有任务快照，按创建时间排序
    pub fn list_all(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.lock().values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 认领已完成任务的交付权，同一时间只有一个调用方能拿到
    pub(crate) fn claim(&self, id: &str) -> Result<Task, TaskError> {
        let mut tasks = self.lock();
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        if task.status != TaskStatus::Completed {
            return Err(TaskError::NotReady {
                task_id: id.to_string(),
                status: task.status,
            });
        }
        if task.claimed {
            return Err(TaskError::AlreadyClaimed(id.to_string()));
        }
        task.claimed = true;
        Ok(task.clone())
    }

    pub(crate) fn release(&self, id: &str) {
        if let Some(task) = self.lock().get_mut(id) {
            task.claimed = false;
        }
    }
}
