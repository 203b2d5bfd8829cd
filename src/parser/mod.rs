use async_trait::async_trait;

use crate::common::client::credential::Credential;
use crate::common::models::VariantSet;

pub mod errors;
pub mod models;
pub mod stream_selector;
pub mod video_parser;

pub use video_parser::BilibiliResolver;

/// 流地址解析器：把视频页面解析成可选的音视频流集合
///
/// 网络或解析失败时返回 None，不会因为“找不到流数据”而报错。
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, url: &str, credential: Option<&Credential>) -> Option<VariantSet>;
}
