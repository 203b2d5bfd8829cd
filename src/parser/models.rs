use serde_derive::Deserialize;

use crate::common::models::{AudioVariant, VariantSet, VideoVariant};

// 页面中 window.__playinfo__ 的结构，只保留用到的字段
#[derive(Debug, Deserialize, Clone)]
pub struct PlayInfo {
    #[serde(default)]
    pub code: i64,
    pub data: Option<PlayUrlData>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlayUrlData {
    pub dash: Option<DashInfo>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashInfo {
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub video: Vec<DashItem>,
    #[serde(default)]
    pub audio: Option<Vec<DashItem>>,
    pub dolby: Option<DolbyInfo>,
    pub flac: Option<FlacInfo>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DolbyInfo {
    pub audio: Option<Vec<DashItem>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FlacInfo {
    pub audio: Option<DashItem>,
}

// 页面里同一字段会同时出现驼峰和下划线两种写法
#[derive(Debug, Deserialize, Clone)]
pub struct DashItem {
    pub id: u32,
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "base_url")]
    pub base_url_snake: Option<String>,
    #[serde(rename = "backupUrl")]
    pub backup_url: Option<Vec<String>>,
    #[serde(rename = "backup_url")]
    pub backup_url_snake: Option<Vec<String>>,
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default)]
    pub codecs: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(rename = "frameRate")]
    pub frame_rate: Option<String>,
    #[serde(rename = "frame_rate")]
    pub frame_rate_snake: Option<String>,
}

impl DashItem {
    fn primary_url(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| self.base_url_snake.clone())
            .filter(|u| !u.is_empty())
    }

    fn backup_urls(&self) -> Vec<String> {
        self.backup_url
            .clone()
            .or_else(|| self.backup_url_snake.clone())
            .unwrap_or_default()
    }

    // 主地址缺失时用第一个备用地址顶上
    fn urls(&self) -> Option<(String, Vec<String>)> {
        let mut backups = self.backup_urls();
        match self.primary_url() {
            Some(url) => Some((url, backups)),
            None if !backups.is_empty() => {
                let url = backups.remove(0);
                Some((url, backups))
            }
            None => None,
        }
    }

    pub fn to_video_variant(&self) -> Option<VideoVariant> {
        let (url, backup_urls) = self.urls()?;
        Some(VideoVariant {
            quality: self.id,
            width: self.width,
            height: self.height,
            frame_rate: self
                .frame_rate
                .clone()
                .or_else(|| self.frame_rate_snake.clone())
                .unwrap_or_default(),
            bandwidth: self.bandwidth,
            codecs: self.codecs.clone(),
            url,
            backup_urls,
        })
    }

    pub fn to_audio_variant(&self) -> Option<AudioVariant> {
        let (url, backup_urls) = self.urls()?;
        Some(AudioVariant {
            quality: self.id,
            bandwidth: self.bandwidth,
            codecs: self.codecs.clone(),
            url,
            backup_urls,
        })
    }
}

impl DashInfo {
    /// 转换为排好序的流集合（含杜比与无损音轨）
    pub fn into_variant_set(self, title: Option<String>) -> VariantSet {
        let video = self
            .video
            .iter()
            .filter_map(DashItem::to_video_variant)
            .collect();

        let mut audio_items = self.audio.unwrap_or_default();
        if let Some(dolby) = self.dolby.and_then(|d| d.audio) {
            audio_items.extend(dolby);
        }
        if let Some(flac) = self.flac.and_then(|f| f.audio) {
            audio_items.push(flac);
        }
        let audio = audio_items
            .iter()
            .filter_map(DashItem::to_audio_variant)
            .collect();

        VariantSet::new(title, self.duration, video, audio)
    }
}
