pub mod common;
pub mod downloader;
pub mod parser;
pub mod post_process;

pub use downloader::{DownloadOptions, DownloadResult, Scheduler, Task, TaskStatus};
