use thiserror::Error;

use crate::common::api::error::ApiError;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("无效的URL: {0}")]
    InvalidUrl(String),
    #[error("未找到window.__playinfo__数据")]
    PlayInfoNotFound,
    #[error("解析错误: {0}")]
    ParseError(String),
    #[error("API错误: {0}")]
    ApiError(#[from] ApiError),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::ParseError(err.to_string())
    }
}
