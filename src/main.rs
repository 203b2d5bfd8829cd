use std::time::Duration;

use anyhow::{Context, Result};
use bili_task_downloader::common::config::OrchestratorConfig;
use bili_task_downloader::common::logger::{PrettyLogger, init_tracing};
use bili_task_downloader::downloader::{DownloadOptions, Scheduler, Task, TaskStatus};
use bili_task_downloader::{log_error, log_info, log_success, log_warning};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::debug;

mod cli;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);
    debug!("命令行参数: {:?}", args);

    let mut config = OrchestratorConfig::default()
        .with_download_dir(&args.download_dir)
        .with_max_concurrent(args.concurrency)
        .with_cookie_file(Some(args.cookie_file.clone()));
    if let Some(ffmpeg) = &args.ffmpeg {
        config = config.with_ffmpeg_path(ffmpeg);
    }

    let scheduler = Scheduler::bilibili(config)
        .await
        .context("初始化下载调度器失败")?;

    if args.list_qualities {
        return list_qualities(&scheduler, &args).await;
    }

    let options = DownloadOptions {
        merge: args.merge,
        filename: args.filename.clone(),
        video_quality_index: args.video_quality,
        audio_quality_index: args.audio_quality,
    };

    let mut task_ids = Vec::new();
    for url in &args.url {
        match scheduler.submit(url, options.clone()) {
            Ok(id) => {
                log_info!("已提交任务 {} -> {}", id, url);
                task_ids.push(id);
            }
            Err(e) => log_warning!("跳过 {}: {}", url, e),
        }
    }
    if task_ids.is_empty() {
        anyhow::bail!("没有可执行的下载任务");
    }

    let finished = tokio::select! {
        tasks = wait_for_tasks(&scheduler, &task_ids) => tasks,
        _ = tokio::signal::ctrl_c() => {
            log_warning!("收到中断信号，正在取消所有任务...");
            scheduler.shutdown();
            wait_for_tasks(&scheduler, &task_ids).await
        }
    };

    PrettyLogger::separator();
    let mut delivered_items = Vec::new();
    let mut failures = 0;
    for task in &finished {
        match task.status {
            TaskStatus::Completed => match deliver(&scheduler, task, &args).await {
                Ok(paths) => delivered_items.extend(paths),
                Err(e) => {
                    failures += 1;
                    log_error!("交付任务 {} 失败: {:#}", task.id, e);
                }
            },
            _ => {
                failures += 1;
                PrettyLogger::task(task);
            }
        }
    }

    if !delivered_items.is_empty() {
        PrettyLogger::completion_summary(delivered_items);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&finished)?);
    }
    if failures > 0 {
        anyhow::bail!("{} 个任务未成功完成", failures);
    }
    Ok(())
}

async fn list_qualities(scheduler: &Scheduler, args: &cli::Cli) -> Result<()> {
    for url in &args.url {
        let options = scheduler
            .quality_options(url)
            .await
            .with_context(|| format!("获取画质列表失败: {}", url))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&options)?);
        } else {
            if let Some(title) = &options.title {
                PrettyLogger::title(title);
            }
            if let Some(cover) = &options.cover {
                PrettyLogger::info(format!("封面: {}", cover));
            }
            PrettyLogger::quality_options(&options);
        }
    }
    Ok(())
}

// 轮询直到所有任务进入终态，返回最后的快照
async fn wait_for_tasks(scheduler: &Scheduler, task_ids: &[String]) -> Vec<Task> {
    let multi = MultiProgress::new();
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    let bars: Vec<ProgressBar> = task_ids
        .iter()
        .map(|_| {
            let pb = multi.add(ProgressBar::new(100));
            pb.set_style(style.clone());
            pb
        })
        .collect();

    let mut last = vec![None::<Task>; task_ids.len()];
    loop {
        let mut pending = 0;
        for (i, id) in task_ids.iter().enumerate() {
            if last[i].as_ref().is_some_and(|t| t.status.is_terminal()) {
                continue;
            }
            let Some(task) = scheduler.status(id) else {
                continue;
            };
            bars[i].set_position(u64::from(task.progress));
            bars[i].set_message(task.message.clone());
            if task.status.is_terminal() {
                bars[i].finish_with_message(task.message.clone());
            } else {
                pending += 1;
            }
            last[i] = Some(task);
        }
        if pending == 0 {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    last.into_iter().flatten().collect()
}

async fn deliver(scheduler: &Scheduler, task: &Task, args: &cli::Cli) -> Result<Vec<String>> {
    let lease = scheduler.retrieve(&task.id)?;
    let delivered = lease.deliver_to(&args.output_dir).await?;
    let report = lease.complete().await;
    if !report.is_clean() {
        log_warning!("部分临时文件未能删除: {:?}", report.failed);
    }

    let mut items = Vec::new();
    for path in delivered {
        PrettyLogger::file_info("文件", path.display().to_string());
        items.push(path.display().to_string());
    }
    if task.mux_method.is_some_and(|m| m.is_degraded()) {
        log_warning!("任务 {} 未使用 ffmpeg 合并，文件可能无法播放", task.id);
    } else {
        log_success!("任务 {} 已完成", task.id);
    }
    Ok(items)
}
