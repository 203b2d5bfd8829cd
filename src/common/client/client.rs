use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use cookie_store::CookieStore;
use flate2::read::{DeflateDecoder, GzDecoder};
use reqwest::{
    Client, ClientBuilder, Response,
    header::{
        ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONTENT_ENCODING, COOKIE, HeaderMap,
        HeaderValue, REFERER, USER_AGENT,
    },
};
use reqwest_cookie_store::CookieStoreMutex;
use tracing::{debug, warn};

use super::credential::Credential;
use crate::common::api::error::ApiError;
use crate::common::config::OrchestratorConfig;

// 支持自动携带 Cookie 的客户端
#[derive(Debug, Clone)]
pub struct BiliClient {
    pub inner: Client,
    pub cookie_store: Arc<CookieStoreMutex>,
}

impl BiliClient {
    // 创建基础客户端，连接超时 10 秒、读取超时 30 秒
    pub fn new() -> Result<Self, ApiError> {
        Self::with_timeouts(Duration::from_secs(10), Duration::from_secs(30))
    }

    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, ApiError> {
        Self::with_timeouts(config.connect_timeout, config.read_timeout)
    }

    pub fn with_timeouts(connect: Duration, read: Duration) -> Result<Self, ApiError> {
        let cookie_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));

        let inner = ClientBuilder::new()
            .connect_timeout(connect)
            .read_timeout(read)
            .cookie_provider(Arc::clone(&cookie_store))
            .default_headers(Self::get_default_headers())
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;

        Ok(Self {
            inner,
            cookie_store,
        })
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9"),
        );
        headers.insert(
            REFERER,
            HeaderValue::from_static("https://www.bilibili.com/"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36"));

        headers
    }

    // 页面请求头，正文可能被压缩，由 read_text_body 负责解压
    fn get_page_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        headers
    }

    // 获取视频流下载专用的请求头
    pub fn get_stream_headers(stream_url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Origin", HeaderValue::from_static("https://www.bilibili.com"));
        // 流文件不压缩，保证 Content-Length 与落盘字节一致
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        // 对于B站的CDN地址，使用播放页面作为Referer
        if stream_url.contains("bilivideo.com") {
            headers.insert(
                REFERER,
                HeaderValue::from_static("https://www.bilibili.com/video/"),
            );
        }
        headers
    }

    /// 请求页面，携带可选的登录凭据
    pub async fn get_page(
        &self,
        url: &str,
        credential: Option<&Credential>,
    ) -> Result<Response, ApiError> {
        let mut request = self.inner.get(url).headers(Self::get_page_headers());
        if let Some(credential) = credential {
            let cookie = credential.header_value();
            debug!("🍪 使用的 Cookie 数量: {}", credential.pairs().len());
            match HeaderValue::from_str(&cookie) {
                Ok(value) => request = request.header(COOKIE, value),
                Err(_) => warn!("Cookie 含有非法字符，已忽略"),
            }
        }

        let resp = request.send().await?;
        Self::check_status(&resp, url)?;
        Ok(resp)
    }

    // 专门用于下载流文件的方法
    pub async fn get_stream_response(&self, url: &str) -> Result<Response, ApiError> {
        debug!("🎬 正在请求流地址: {}", url);
        let resp = self
            .inner
            .get(url)
            .headers(Self::get_stream_headers(url))
            .send()
            .await?;

        Ok(resp)
    }

    /// 读取文本正文：按 Content-Encoding 解压后自动探测编码
    pub async fn read_text_body(resp: Response) -> Result<String, ApiError> {
        let content_encoding = resp
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase());

        let raw = resp.bytes().await?;
        let bytes = Self::decompress_content(&raw, content_encoding.as_deref())
            .map_err(|e| ApiError::InvalidResponse(format!("解压缩失败: {}", e)))?;

        let mut detector = chardetng::EncodingDetector::new();
        detector.feed(&bytes, true);
        let encoding = detector.guess(None, true);
        let (decoded, _, had_errors) = encoding.decode(&bytes);
        if had_errors {
            warn!("文本解码过程中发现错误，可能存在字符丢失");
        }
        Ok(decoded.into_owned())
    }

    // 解压缩内容的辅助函数
    fn decompress_content(
        bytes: &[u8],
        content_encoding: Option<&str>,
    ) -> Result<Vec<u8>, std::io::Error> {
        let mut decompressed = Vec::new();
        match content_encoding {
            Some("gzip") => {
                GzDecoder::new(bytes).read_to_end(&mut decompressed)?;
            }
            Some("deflate") => {
                DeflateDecoder::new(bytes).read_to_end(&mut decompressed)?;
            }
            Some(other) if other != "identity" => {
                warn!("未知的内容编码: {}", other);
                decompressed.extend_from_slice(bytes);
            }
            _ => decompressed.extend_from_slice(bytes),
        }
        Ok(decompressed)
    }

    // 检查响应状态并处理特殊情况
    pub fn check_status(resp: &Response, url: &str) -> Result<(), ApiError> {
        let status = resp.status();
        debug!("Response Status: {}", status);

        match status {
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::TOO_MANY_REQUESTS => {
                warn!("🚫 检测到 {} 状态码，可能触发了风控机制，建议稍后重试", status);
            }
            status if status.is_success() => return Ok(()),
            _ => warn!("❌ 非成功状态码: {}", status),
        }

        Err(ApiError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}
