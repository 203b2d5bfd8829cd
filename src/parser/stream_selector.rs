use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::common::models::{AudioVariant, VariantSet, VideoVariant};

lazy_static! {
    static ref BVID_PATTERN: Regex = Regex::new(r"BV[a-zA-Z0-9]+").unwrap();
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap();
}

// 视频清晰度ID -> 名称
const VIDEO_QUALITY_NAMES: &[(u32, &str)] = &[
    (127, "超清 8K"),
    (126, "杜比视界"),
    (125, "HDR真彩"),
    (120, "超清 4K"),
    (116, "高清 1080P60"),
    (112, "高清 1080P+"),
    (80, "高清 1080P"),
    (74, "高清 720P60"),
    (64, "高清 720P"),
    (32, "清晰 480P"),
    (16, "流畅 360P"),
];

// 音频档位ID -> 名称
const AUDIO_QUALITY_NAMES: &[(u32, &str)] = &[
    (30251, "Hi-Res无损"),
    (30250, "杜比全景声"),
    (30280, "320K"),
    (30232, "128K"),
    (30216, "64K"),
];

/// 选中的一对音视频流
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub video_index: usize,
    pub audio_index: usize,
    pub video: VideoVariant,
    pub audio: AudioVariant,
}

impl Selection {
    pub fn video_name(&self) -> String {
        QualitySelector::video_quality_name(self.video.quality)
    }

    pub fn audio_name(&self) -> String {
        QualitySelector::audio_quality_name(self.audio.quality)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoOption {
    pub index: usize,
    pub quality_id: u32,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: String,
    pub bandwidth: u64,
    pub codecs: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioOption {
    pub index: usize,
    pub quality_id: u32,
    pub name: String,
    pub bandwidth: u64,
    pub codecs: String,
}

/// 可选画质/音质列表
#[derive(Debug, Clone, Serialize)]
pub struct QualityOptions {
    pub title: Option<String>,
    pub cover: Option<String>,
    pub duration: u64,
    pub video: Vec<VideoOption>,
    pub audio: Vec<AudioOption>,
}

pub struct QualitySelector;

impl QualitySelector {
    /// 按下标选择音视频流，下标越界时退回 0（最高质量）
    ///
    /// 流列表为空时返回 None。
    pub fn select(set: &VariantSet, video_index: usize, audio_index: usize) -> Option<Selection> {
        let video_index = Self::clamp_index(video_index, set.video().len(), "视频");
        let audio_index = Self::clamp_index(audio_index, set.audio().len(), "音频");

        let video = set.video().get(video_index)?.clone();
        let audio = set.audio().get(audio_index)?.clone();
        debug!(
            "选择视频流: 下标={}, 清晰度ID={}, 带宽={}; 音频流: 下标={}, ID={}",
            video_index, video.quality, video.bandwidth, audio_index, audio.quality
        );

        Some(Selection {
            video_index,
            audio_index,
            video,
            audio,
        })
    }

    fn clamp_index(index: usize, len: usize, kind: &str) -> usize {
        if index < len {
            index
        } else {
            if len > 0 {
                warn!("{}质量下标 {} 超出范围（共 {} 个），使用最高质量", kind, index, len);
            }
            0
        }
    }

    pub fn video_quality_name(quality_id: u32) -> String {
        VIDEO_QUALITY_NAMES
            .iter()
            .find(|(id, _)| *id == quality_id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("未知质量({})", quality_id))
    }

    pub fn audio_quality_name(quality_id: u32) -> String {
        AUDIO_QUALITY_NAMES
            .iter()
            .find(|(id, _)| *id == quality_id)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("未知音质({})", quality_id))
    }

    pub fn describe(set: &VariantSet) -> QualityOptions {
        QualityOptions {
            title: set.title.clone(),
            cover: set.cover.clone(),
            duration: set.duration,
            video: set
                .video()
                .iter()
                .enumerate()
                .map(|(index, v)| VideoOption {
                    index,
                    quality_id: v.quality,
                    name: Self::video_quality_name(v.quality),
                    width: v.width,
                    height: v.height,
                    frame_rate: v.frame_rate.clone(),
                    bandwidth: v.bandwidth,
                    codecs: v.codecs.clone(),
                })
                .collect(),
            audio: set
                .audio()
                .iter()
                .enumerate()
                .map(|(index, a)| AudioOption {
                    index,
                    quality_id: a.quality,
                    name: Self::audio_quality_name(a.quality),
                    bandwidth: a.bandwidth,
                    codecs: a.codecs.clone(),
                })
                .collect(),
        }
    }
}

/// 一个任务在下载目录里用到的全部文件名
///
/// 默认文件名都带上任务ID前缀，并发任务不会写同一个文件。
/// 只有调用方自定义文件名时合并输出才不带任务ID，冲突由调用方负责。
#[derive(Debug, Clone, PartialEq)]
pub struct OutputNaming {
    base: String,
    tag: String,
    custom: bool,
    video_label: String,
    audio_label: String,
}

impl OutputNaming {
    pub fn new(url: &str, filename: Option<&str>, task_id: &str, selection: &Selection) -> Self {
        let custom = filename
            .map(sanitize_filename)
            .filter(|name| !name.is_empty());
        let is_custom = custom.is_some();
        let base = custom
            .or_else(|| extract_bvid(url))
            .unwrap_or_else(|| format!("bilibili_video_{}", chrono::Utc::now().timestamp()));

        Self {
            base,
            custom: is_custom,
            tag: task_id.chars().filter(|c| *c != '-').take(8).collect(),
            video_label: selection.video_name().replace(' ', "_"),
            audio_label: selection.audio_name().replace(' ', "_"),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn temp_video(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_{}_temp_video.m4v", self.base, self.tag))
    }

    pub fn temp_audio(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_{}_temp_audio.m4a", self.base, self.tag))
    }

    pub fn merged_output(&self, dir: &Path) -> PathBuf {
        if self.custom {
            dir.join(format!("{}_{}.mp4", self.base, self.video_label))
        } else {
            dir.join(format!("{}_{}_{}.mp4", self.base, self.video_label, self.tag))
        }
    }

    pub fn split_video(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_{}_{}_video.m4v", self.base, self.video_label, self.tag))
    }

    pub fn split_audio(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_{}_{}_audio.m4a", self.base, self.audio_label, self.tag))
    }
}

pub fn extract_bvid(url: &str) -> Option<String> {
    BVID_PATTERN.find(url).map(|m| m.as_str().to_string())
}

// 去掉路径分隔符和文件系统不允许的字符
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_CHARS
        .replace_all(name.trim(), "_")
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::models::fixtures::{audio, video};

    fn sample_set() -> VariantSet {
        VariantSet::new(
            Some("标题".to_string()),
            60,
            vec![video(80, 100), video(120, 500), video(64, 300)],
            vec![audio(30216, 64_000), audio(30280, 320_000)],
        )
    }

    #[test]
    fn index_zero_is_best_quality() {
        let selection = QualitySelector::select(&sample_set(), 0, 0).unwrap();
        assert_eq!(selection.video.quality, 120);
        assert_eq!(selection.audio.quality, 30280);
    }

    #[test]
    fn out_of_range_index_falls_back_to_best() {
        let set = sample_set();
        let selection = QualitySelector::select(&set, 1, 7).unwrap();
        assert_eq!(selection.video.quality, 80);
        assert_eq!(selection.audio_index, 0);
        assert_eq!(selection.audio, set.audio()[0]);
    }

    #[test]
    fn empty_lists_select_nothing() {
        let set = VariantSet::new(None, 0, vec![video(80, 1)], vec![]);
        assert!(QualitySelector::select(&set, 0, 0).is_none());
    }

    #[test]
    fn quality_names() {
        assert_eq!(QualitySelector::video_quality_name(80), "高清 1080P");
        assert_eq!(QualitySelector::video_quality_name(6), "未知质量(6)");
        assert_eq!(QualitySelector::audio_quality_name(30280), "320K");
        assert_eq!(QualitySelector::audio_quality_name(1), "未知音质(1)");
    }

    #[test]
    fn describe_keeps_resolved_order() {
        let options = QualitySelector::describe(&sample_set());
        let ids: Vec<u32> = options.video.iter().map(|o| o.quality_id).collect();
        assert_eq!(ids, vec![120, 80, 64]);
        assert_eq!(options.video[0].name, "超清 4K");
        assert_eq!(options.audio[1].index, 1);
        assert_eq!(options.cover, None);

        let with_cover = sample_set().with_cover(Some("https://i0.hdslb.com/c.jpg".into()));
        assert_eq!(
            QualitySelector::describe(&with_cover).cover.as_deref(),
            Some("https://i0.hdslb.com/c.jpg")
        );
    }

    #[test]
    fn naming_prefers_override_then_bvid() {
        let selection = QualitySelector::select(&sample_set(), 1, 0).unwrap();
        let dir = Path::new("downloads");

        let naming = OutputNaming::new(
            "https://www.bilibili.com/video/BV1xx411c7mD?p=1",
            None,
            "1234abcd-0000-0000-0000-000000000000",
            &selection,
        );
        assert_eq!(naming.base(), "BV1xx411c7mD");
        assert_eq!(
            naming.merged_output(dir),
            dir.join("BV1xx411c7mD_高清_1080P_1234abcd.mp4")
        );
        assert_eq!(
            naming.temp_video(dir),
            dir.join("BV1xx411c7mD_1234abcd_temp_video.m4v")
        );
        assert_eq!(
            naming.split_audio(dir),
            dir.join("BV1xx411c7mD_320K_1234abcd_audio.m4a")
        );

        let custom = OutputNaming::new("https://b23.tv/x", Some("../我的/视频"), "t", &selection);
        assert_eq!(custom.base(), "_我的_视频");
        assert_eq!(custom.merged_output(dir), dir.join("_我的_视频_高清_1080P.mp4"));
    }

    #[test]
    fn pages_of_one_video_get_distinct_outputs() {
        let selection = QualitySelector::select(&sample_set(), 0, 0).unwrap();
        let dir = Path::new("downloads");
        let first = OutputNaming::new(
            "https://www.bilibili.com/video/BV1xx411c7mD?p=1",
            None,
            "aaaa1111-0000",
            &selection,
        );
        let second = OutputNaming::new(
            "https://www.bilibili.com/video/BV1xx411c7mD?p=2",
            None,
            "bbbb2222-0000",
            &selection,
        );
        assert_eq!(first.base(), second.base());
        assert_ne!(first.merged_output(dir), second.merged_output(dir));
    }

    #[test]
    fn naming_without_bvid_uses_timestamp() {
        let selection = QualitySelector::select(&sample_set(), 0, 0).unwrap();
        let naming = OutputNaming::new("https://example.com/watch", Some("  "), "t", &selection);
        assert!(naming.base().starts_with("bilibili_video_"));
    }
}
