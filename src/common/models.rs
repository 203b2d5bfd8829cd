use itertools::Itertools;
use serde::Serialize;

// 音频档位类别：无损 > 杜比 > 普通码率
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioTierClass {
    Standard,
    Enhanced,
    Lossless,
}

impl AudioTierClass {
    pub const HI_RES_ID: u32 = 30251;
    pub const DOLBY_ID: u32 = 30250;

    pub fn from_quality_id(id: u32) -> Self {
        match id {
            Self::HI_RES_ID => Self::Lossless,
            Self::DOLBY_ID => Self::Enhanced,
            _ => Self::Standard,
        }
    }
}

/// 一路视频流
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoVariant {
    pub quality: u32,
    pub width: u32,
    pub height: u32,
    pub frame_rate: String,
    pub bandwidth: u64,
    pub codecs: String,
    pub url: String,
    pub backup_urls: Vec<String>,
}

/// 一路音频流
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioVariant {
    pub quality: u32,
    pub bandwidth: u64,
    pub codecs: String,
    pub url: String,
    pub backup_urls: Vec<String>,
}

impl AudioVariant {
    pub fn tier_class(&self) -> AudioTierClass {
        AudioTierClass::from_quality_id(self.quality)
    }
}

/// 解析出来的全部可选流，构造时排好序，之后不再重排。
///
/// 下标 0 永远是质量最高的那一路，按下标选流依赖这个顺序。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSet {
    pub title: Option<String>,
    pub cover: Option<String>,
    pub duration: u64,
    video: Vec<VideoVariant>,
    audio: Vec<AudioVariant>,
}

impl VariantSet {
    pub fn new(
        title: Option<String>,
        duration: u64,
        video: Vec<VideoVariant>,
        audio: Vec<AudioVariant>,
    ) -> Self {
        // 视频: (清晰度ID, 带宽) 降序
        let video = video
            .into_iter()
            .sorted_by(|a, b| (b.quality, b.bandwidth).cmp(&(a.quality, a.bandwidth)))
            .collect();
        // 音频: (档位类别, 带宽) 降序
        let audio = audio
            .into_iter()
            .sorted_by(|a, b| (b.tier_class(), b.bandwidth).cmp(&(a.tier_class(), a.bandwidth)))
            .collect();

        Self {
            title,
            cover: None,
            duration,
            video,
            audio,
        }
    }

    pub fn with_cover(mut self, cover: Option<String>) -> Self {
        self.cover = cover;
        self
    }

    pub fn video(&self) -> &[VideoVariant] {
        &self.video
    }

    pub fn audio(&self) -> &[AudioVariant] {
        &self.audio
    }

    pub fn is_playable(&self) -> bool {
        !self.video.is_empty() && !self.audio.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{audio, video};
    use super::*;

    #[test]
    fn video_sorted_by_bandwidth_within_same_tier() {
        let set = VariantSet::new(
            None,
            0,
            vec![video(80, 100), video(80, 500), video(80, 300)],
            vec![audio(30280, 1)],
        );
        let bandwidths: Vec<u64> = set.video().iter().map(|v| v.bandwidth).collect();
        assert_eq!(bandwidths, vec![500, 300, 100]);
    }

    #[test]
    fn video_tier_outranks_bandwidth() {
        let set = VariantSet::new(
            None,
            0,
            vec![video(64, 900), video(120, 100), video(80, 500)],
            vec![],
        );
        let ids: Vec<u32> = set.video().iter().map(|v| v.quality).collect();
        assert_eq!(ids, vec![120, 80, 64]);
    }

    #[test]
    fn special_audio_tiers_rank_first() {
        let set = VariantSet::new(
            None,
            0,
            vec![],
            vec![
                audio(30280, 320_000),
                audio(30250, 100_000),
                audio(30216, 64_000),
                audio(30251, 90_000),
            ],
        );
        let ids: Vec<u32> = set.audio().iter().map(|a| a.quality).collect();
        assert_eq!(ids, vec![30251, 30250, 30280, 30216]);
        assert!(!set.is_playable());
    }
}
