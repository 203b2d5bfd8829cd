use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::downloader::error::DownloadError;
use crate::downloader::models::MuxMethod;

/// 音视频合并（流复制，不重新编码）
#[derive(Debug, Clone)]
pub struct MediaMerger {
    ffmpeg: String,
}

impl MediaMerger {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
        }
    }

    /// 检查 ffmpeg 是否可用
    pub async fn is_available(&self) -> bool {
        debug!("检查系统中是否安装了 ffmpeg...");
        let status = Command::new(&self.ffmpeg)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        matches!(status, Ok(s) if s.success())
    }

    /// 启动时的检查，缺失时只给出提示
    pub async fn probe(&self) -> bool {
        let available = self.is_available().await;
        if available {
            debug!("✅ 已检测到 ffmpeg: {}", self.ffmpeg);
        } else {
            warn!("⚠️ 未检测到 ffmpeg，合并时将使用直接拼接（输出文件可能无法播放）");
            warn!("安装方法参考：https://ffmpeg.org/download.html");
            warn!("或者设置环境变量 FFMPEG_PATH 指向 ffmpeg 可执行文件路径");
        }
        available
    }

    /// 合并视频和音频到 `output_path`，返回实际使用的合并方式
    ///
    /// 输出文件已存在时直接返回 [`MuxMethod::Existing`]；
    /// 找不到 ffmpeg 时退回直接拼接 [`MuxMethod::Concat`]。
    pub async fn merge_av(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<MuxMethod, DownloadError> {
        if output_path.exists() {
            info!("📦 输出文件已存在，跳过合并: {:?}", output_path);
            return Ok(MuxMethod::Existing);
        }

        // 检查输入文件是否存在
        if !video_path.exists() {
            return Err(DownloadError::FileNotFound(video_path.to_path_buf()));
        }
        debug!("✅ 视频文件存在: {:?}", video_path);

        if !audio_path.exists() {
            return Err(DownloadError::FileNotFound(audio_path.to_path_buf()));
        }
        debug!("✅ 音频文件存在: {:?}", audio_path);

        debug!("开始合并视频和音频 -> 输出路径: {:?}", output_path);
        let spawned = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(video_path)
            .arg("-i")
            .arg(audio_path)
            .arg("-c:v")
            .arg("copy")
            .arg("-c:a")
            .arg("copy")
            .arg("-y") // 自动覆盖
            .arg(output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match spawned {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("⚠️ 未找到 ffmpeg ({})，使用直接拼接", self.ffmpeg);
                return Self::concat_fallback(video_path, audio_path, output_path).await;
            }
            Err(e) => {
                error!("❌ 启动 ffmpeg 失败: {}", e);
                Self::discard_output(output_path).await;
                return Err(DownloadError::FfmpegError(e.to_string()));
            }
        };

        if !output.status.success() {
            let err_msg = String::from_utf8_lossy(&output.stderr);
            error!("❌ ffmpeg 合并失败，错误日志如下：\n{}", err_msg);
            error!(
                "请检查以下几点：\n\
                1. 输入文件路径是否正确；\n\
                2. 视频/音频文件编码格式是否兼容；\n\
                3. 是否有写入权限到输出路径：{:?};",
                output_path
            );
            // 失败时不保留输出文件
            Self::discard_output(output_path).await;
            return Err(DownloadError::FfmpegError(format!(
                "退出码 {:?}: {}",
                output.status.code(),
                err_msg.trim()
            )));
        }

        // 退出码为 0 但没有产出文件同样视为失败
        if !output_path.exists() {
            return Err(DownloadError::MergeError(format!(
                "ffmpeg 未生成输出文件: {:?}",
                output_path
            )));
        }

        info!("✅ 视频与音频合并成功，输出文件: {:?}", output_path);
        Ok(MuxMethod::Ffmpeg)
    }

    // 直接把音频字节追加到视频后面，不保证容器有效
    async fn concat_fallback(
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<MuxMethod, DownloadError> {
        let result = async {
            let mut out = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(output_path)
                .await?;
            for input in [video_path, audio_path] {
                let mut file = File::open(input).await?;
                tokio::io::copy(&mut file, &mut out).await?;
            }
            out.flush().await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                warn!("⚠️ 已使用直接拼接生成文件，可能无法正常播放: {:?}", output_path);
                Ok(MuxMethod::Concat)
            }
            Err(e) => {
                Self::discard_output(output_path).await;
                Err(DownloadError::MergeError(format!("直接拼接失败: {}", e)))
            }
        }
    }

    async fn discard_output(output_path: &Path) {
        match tokio::fs::remove_file(output_path).await {
            Ok(()) => debug!("🗑️ 已删除未完成的输出文件: {:?}", output_path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("删除未完成的输出文件失败: {:?} ({})", output_path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let video = dir.join("v.m4v");
        let audio = dir.join("a.m4a");
        std::fs::write(&video, b"VIDEO").unwrap();
        std::fs::write(&audio, b"AUDIO").unwrap();
        (video, audio)
    }

    #[tokio::test]
    async fn missing_tool_falls_back_to_concat() {
        let dir = tempfile::tempdir().unwrap();
        let (video, audio) = inputs(dir.path());
        let output = dir.path().join("out.mp4");

        let merger = MediaMerger::new("/nonexistent/bin/ffmpeg-missing");
        assert!(!merger.is_available().await);

        let method = merger.merge_av(&video, &audio, &output).await.unwrap();
        assert_eq!(method, MuxMethod::Concat);
        assert!(method.is_degraded());
        assert_eq!(std::fs::read(&output).unwrap(), b"VIDEOAUDIO");
    }

    #[tokio::test]
    async fn existing_output_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        std::fs::write(&output, b"done").unwrap();

        let merger = MediaMerger::new("/nonexistent/bin/ffmpeg-missing");
        let method = merger
            .merge_av(&dir.path().join("no-v"), &dir.path().join("no-a"), &output)
            .await
            .unwrap();
        assert_eq!(method, MuxMethod::Existing);
        assert_eq!(std::fs::read(&output).unwrap(), b"done");
    }

    #[tokio::test]
    async fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let merger = MediaMerger::new("/nonexistent/bin/ffmpeg-missing");
        let err = merger
            .merge_av(
                &dir.path().join("no-v"),
                &dir.path().join("no-a"),
                &dir.path().join("out.mp4"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::FileNotFound(_)));
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn primary_tool_writes_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        let (video, audio) = inputs(dir.path());
        let output = dir.path().join("out.mp4");
        // 把最后一个参数（输出路径）写成文件
        let ffmpeg = fake_ffmpeg(
            dir.path(),
            "#!/bin/sh\n[ \"$#\" -gt 1 ] || exit 0\nfor last; do :; done\necho muxed > \"$last\"\n",
        );

        let merger = MediaMerger::new(ffmpeg);
        assert!(merger.is_available().await);
        let method = merger.merge_av(&video, &audio, &output).await.unwrap();
        assert_eq!(method, MuxMethod::Ffmpeg);
        assert!(output.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn zero_exit_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (video, audio) = inputs(dir.path());
        let merger = MediaMerger::new(fake_ffmpeg(dir.path(), "#!/bin/sh\nexit 0\n"));

        let err = merger
            .merge_av(&video, &audio, &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::MergeError(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (video, audio) = inputs(dir.path());
        let merger = MediaMerger::new(fake_ffmpeg(dir.path(), "#!/bin/sh\necho bad >&2\nexit 1\n"));

        let err = merger
            .merge_av(&video, &audio, &dir.path().join("out.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::FfmpegError(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_run_removes_truncated_output() {
        let dir = tempfile::tempdir().unwrap();
        let (video, audio) = inputs(dir.path());
        let output = dir.path().join("out.mp4");
        let merger = MediaMerger::new(fake_ffmpeg(
            dir.path(),
            "#!/bin/sh\n[ \"$#\" -gt 1 ] || exit 0\nfor last; do :; done\necho TRUNC > \"$last\"\nexit 1\n",
        ));

        let err = merger.merge_av(&video, &audio, &output).await.unwrap_err();
        assert!(matches!(err, DownloadError::FfmpegError(_)));
        assert!(!output.exists());

        // 重试不会把半成品当成已存在的输出
        let err = merger.merge_av(&video, &audio, &output).await.unwrap_err();
        assert!(matches!(err, DownloadError::FfmpegError(_)));
    }
}
