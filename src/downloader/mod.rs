pub mod artifact;
pub mod core;
pub mod error;
pub mod models;
pub mod progress;
pub mod retention;
pub mod scheduler;
pub mod store;

pub use artifact::ArtifactLease;
pub use self::core::StreamFetcher;
pub use error::{DownloadError, TaskError};
pub use models::{DownloadOptions, DownloadResult, MuxMethod, Task, TaskStatus, TaskUpdate};
pub use retention::{
    CleanupReport, DelayStrategy, FileRemover, FsRemover, LinearBackoff, NoDelay, RetentionManager,
};
pub use scheduler::Scheduler;
pub use store::TaskStore;
