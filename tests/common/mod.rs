#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bili_task_downloader::common::client::credential::Credential;
use bili_task_downloader::common::config::OrchestratorConfig;
use bili_task_downloader::common::models::{AudioVariant, VariantSet, VideoVariant};
use bili_task_downloader::downloader::{Scheduler, Task};
use bili_task_downloader::parser::SourceResolver;
use tokio::sync::Semaphore;

pub const VIDEO_BYTES: &[u8] = b"VIDEO-STREAM-0123456789";
pub const AUDIO_BYTES: &[u8] = b"AUDIO-STREAM";
pub const SLOW_FIRST_CHUNK: usize = 4096;
pub const SLOW_TOTAL: usize = SLOW_FIRST_CHUNK * 4;

/// 本地流服务器，`/slow` 发送第一块后等待 `release()`
pub struct TestServer {
    pub base: String,
    gate: Arc<Semaphore>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn release(&self) {
        self.gate.add_permits(1024);
    }
}

async fn video() -> Vec<u8> {
    VIDEO_BYTES.to_vec()
}

async fn audio() -> Vec<u8> {
    AUDIO_BYTES.to_vec()
}

async fn missing() -> StatusCode {
    StatusCode::NOT_FOUND
}

// 不带 Content-Length 的分块响应
async fn chunked() -> Response {
    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"part-1;")),
        Ok(Bytes::from_static(b"part-2;")),
    ];
    Body::from_stream(futures::stream::iter(chunks)).into_response()
}

async fn slow(State(gate): State<Arc<Semaphore>>) -> Response {
    let stream = futures::stream::unfold(0u8, move |step| {
        let gate = Arc::clone(&gate);
        async move {
            match step {
                0 => Some((Ok::<_, std::io::Error>(Bytes::from(vec![b's'; SLOW_FIRST_CHUNK])), 1)),
                1 => {
                    let _permit = gate.acquire().await.ok()?;
                    Some((Ok(Bytes::from(vec![b's'; SLOW_TOTAL - SLOW_FIRST_CHUNK])), 2))
                }
                _ => None,
            }
        }
    });
    (
        [(header::CONTENT_LENGTH, SLOW_TOTAL.to_string())],
        Body::from_stream(stream),
    )
        .into_response()
}

pub async fn spawn_server() -> TestServer {
    let gate = Arc::new(Semaphore::new(0));
    let app = Router::new()
        .route("/video.m4v", get(video))
        .route("/audio.m4a", get(audio))
        .route("/missing", get(missing))
        .route("/chunked", get(chunked))
        .route("/slow", get(slow))
        .with_state(Arc::clone(&gate));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        gate,
    }
}

pub fn video_variant(quality: u32, bandwidth: u64, url: String) -> VideoVariant {
    VideoVariant {
        quality,
        width: 1920,
        height: 1080,
        frame_rate: "30".to_string(),
        bandwidth,
        codecs: "avc1.640032".to_string(),
        url,
        backup_urls: Vec::new(),
    }
}

pub fn audio_variant(quality: u32, bandwidth: u64, url: String) -> AudioVariant {
    AudioVariant {
        quality,
        bandwidth,
        codecs: "mp4a.40.2".to_string(),
        url,
        backup_urls: Vec::new(),
    }
}

pub fn variant_set(video_url: String, audio_url: String) -> VariantSet {
    VariantSet::new(
        Some("测试视频".to_string()),
        10,
        vec![video_variant(80, 1_000, video_url)],
        vec![audio_variant(30280, 320_000, audio_url)],
    )
}

/// 固定映射的解析器：未登记的URL解析失败
#[derive(Default)]
pub struct FakeResolver {
    sets: HashMap<String, VariantSet>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn with(mut self, url: &str, set: VariantSet) -> Self {
        self.sets.insert(url.to_string(), set);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceResolver for FakeResolver {
    async fn resolve(&self, url: &str, _credential: Option<&Credential>) -> Option<VariantSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sets.get(url).cloned()
    }
}

pub fn test_config(dir: &std::path::Path) -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_download_dir(dir.join("downloads"))
        .with_cookie_file(None)
        .with_ffmpeg_path("/nonexistent/bin/ffmpeg-missing")
        .with_cleanup_backoff(Duration::ZERO)
}

pub async fn scheduler(dir: &std::path::Path, resolver: FakeResolver) -> Scheduler {
    Scheduler::new(test_config(dir), Arc::new(resolver))
        .await
        .unwrap()
}

/// 轮询直到满足条件，超时则 panic
pub async fn wait_until<F>(scheduler: &Scheduler, task_id: &str, mut done: F) -> Task
where
    F: FnMut(&Task) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = scheduler.status(task_id) {
            if done(&task) {
                return task;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "等待任务 {} 超时: {:?}",
            task_id,
            scheduler.status(task_id)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_terminal(scheduler: &Scheduler, task_id: &str) -> Task {
    wait_until(scheduler, task_id, |t| t.status.is_terminal()).await
}
