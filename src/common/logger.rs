use colored::*;

use crate::downloader::models::{Task, TaskStatus};
use crate::parser::stream_selector::QualityOptions;

/// 初始化 tracing 日志
pub fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    // 重复初始化（例如测试中）时忽略错误
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init();
}

/// 漂亮的日志输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示文件信息
    pub fn file_info(label: impl AsRef<str>, path: impl AsRef<str>) {
        println!("{} {}: {}", "📁".blue().bold(), label.as_ref().bold(), path.as_ref());
    }

    /// 显示分割线
    pub fn separator() {
        println!("{}", "─".repeat(50).bright_black());
    }

    /// 显示标题
    pub fn title(text: impl AsRef<str>) {
        let text = text.as_ref();
        let width = text.chars().count().min(48);
        let padding = (48 - width) / 2;
        println!(
            "{} {} {}",
            "─".repeat(padding).bright_black(),
            text.bold(),
            "─".repeat(48 - padding - width).bright_black()
        );
    }

    pub fn status_icon(status: TaskStatus) -> ColoredString {
        match status {
            TaskStatus::Pending => "⏳".yellow(),
            TaskStatus::Downloading => "⬇".blue(),
            TaskStatus::Completed => "✅".green(),
            TaskStatus::Failed => "❌".red(),
        }
    }

    /// 显示任务快照
    pub fn task(task: &Task) {
        println!(
            "{} {} [{}] {}% - {}",
            Self::status_icon(task.status),
            task.id.bold(),
            task.status.to_string().to_uppercase(),
            task.progress,
            task.message
        );
        println!("   视频URL: {}", task.url.bright_black());
        println!(
            "   创建时间: {}",
            task.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(error) = &task.error {
            println!("   错误信息: {}", error.red());
        }
    }

    /// 显示可选画质
    pub fn quality_options(options: &QualityOptions) {
        Self::title("视频质量选项");
        for option in &options.video {
            println!(
                "  [{}] {} ({}x{} @ {}fps, {} kbps, {})",
                option.index,
                option.name.cyan(),
                option.width,
                option.height,
                option.frame_rate,
                option.bandwidth / 1000,
                option.codecs
            );
        }
        Self::title("音频质量选项");
        for option in &options.audio {
            println!(
                "  [{}] {} ({} kbps, {})",
                option.index,
                option.name.cyan(),
                option.bandwidth / 1000,
                option.codecs
            );
        }
        Self::separator();
        println!("  时长: {} 秒", options.duration);
    }

    /// 显示完成总结
    pub fn completion_summary(items: Vec<impl AsRef<str>>) {
        println!("\n{}", "🎉 下载完成！".green().bold());
        for item in items {
            println!("  {}", item.as_ref());
        }
    }
}

/// 便捷宏用于漂亮的日志输出
#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}
