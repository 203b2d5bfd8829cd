use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, error, info, warn};

use super::SourceResolver;
use super::errors::ParseError;
use super::models::PlayInfo;
use crate::common::client::client::BiliClient;
use crate::common::client::credential::Credential;
use crate::common::models::VariantSet;

lazy_static! {
    static ref PLAYINFO_PATTERN: Regex =
        Regex::new(r"(?s)<script>window\.__playinfo__\s*=\s*(\{.*?\})</script>").unwrap();
    static ref TITLE_PATTERN: Regex = Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap();
    static ref TITLE_SUFFIX: Regex = Regex::new(r"_哔哩哔哩_bilibili$").unwrap();
    // 按顺序尝试的封面来源
    static ref COVER_PATTERNS: Vec<Regex> = vec![
        Regex::new(r#"(?i)<meta\s+property="og:image"\s+content="([^"]+)""#).unwrap(),
        Regex::new(r#"(?i)<meta\s+name="twitter:image"\s+content="([^"]+)""#).unwrap(),
        Regex::new(r#""pic"\s*:\s*"([^"]+)""#).unwrap(),
    ];
}

/// 通过抓取视频页面中的 `window.__playinfo__` 获取 DASH 流
pub struct BilibiliResolver {
    client: BiliClient,
}

impl BilibiliResolver {
    pub fn new(client: BiliClient) -> Self {
        Self { client }
    }

    async fn fetch_variants(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<VariantSet, ParseError> {
        url::Url::parse(url).map_err(|_| ParseError::InvalidUrl(url.to_string()))?;

        let resp = self.client.get_page(url, credential).await?;
        let html = BiliClient::read_text_body(resp).await?;
        debug!("页面长度: {} 字节", html.len());

        parse_page(&html)
    }
}

#[async_trait]
impl SourceResolver for BilibiliResolver {
    async fn resolve(&self, url: &str, credential: Option<&Credential>) -> Option<VariantSet> {
        info!("开始解析: {}", url);
        match self.fetch_variants(url, credential).await {
            Ok(set) => {
                info!(
                    "解析完成: 视频流 {} 个, 音频流 {} 个",
                    set.video().len(),
                    set.audio().len()
                );
                Some(set)
            }
            Err(e) => {
                error!("解析失败: {}", e);
                None
            }
        }
    }
}

/// 从页面 HTML 中提取流信息
pub fn parse_page(html: &str) -> Result<VariantSet, ParseError> {
    let json = PLAYINFO_PATTERN
        .captures(html)
        .and_then(|c| c.get(1))
        .ok_or(ParseError::PlayInfoNotFound)?
        .as_str();

    let playinfo: PlayInfo = serde_json::from_str(json).map_err(|e| {
        let preview: String = json.chars().take(200).collect();
        warn!("JSON解析失败: {}，原始JSON字符串: {}...", e, preview);
        ParseError::from(e)
    })?;

    if playinfo.code != 0 {
        warn!("playinfo 返回非零状态码: {}", playinfo.code);
    }

    let dash = playinfo
        .data
        .and_then(|d| d.dash)
        .ok_or_else(|| ParseError::ParseError("playinfo 中没有 DASH 数据".to_string()))?;

    Ok(dash
        .into_variant_set(extract_title(html))
        .with_cover(extract_cover(html)))
}

/// 提取视频标题，去掉站点后缀
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_PATTERN.captures(html)?.get(1)?.as_str().trim();
    let title = TITLE_SUFFIX.replace(raw, "").trim().to_string();
    if title.is_empty() { None } else { Some(title) }
}

/// 提取封面地址，统一成 https
pub fn extract_cover(html: &str) -> Option<String> {
    COVER_PATTERNS.iter().find_map(|pattern| {
        let raw = pattern.captures(html)?.get(1)?.as_str();
        let cover = raw.replace("\\/", "/").replace("\\u002F", "/");
        let cover = match cover.strip_prefix("//") {
            Some(rest) => format!("https://{}", rest),
            None => cover,
        };
        let cover = match cover.strip_prefix("http://") {
            Some(rest) => format!("https://{}", rest),
            None => cover,
        };
        cover.starts_with("https://").then_some(cover)
    })
}
