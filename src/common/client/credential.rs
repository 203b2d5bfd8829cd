use std::collections::BTreeMap;
use std::path::Path;

use cookie::Cookie;
use serde_json::Value;
use tracing::{debug, warn};

/// 登录凭据（Cookie），由外部登录流程产生
///
/// 既可以是原始的 `k=v; k2=v2` 字符串，也可以是结构化的键值对。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Raw(String),
    Pairs(BTreeMap<String, String>),
}

impl Credential {
    // 解析 Cookie 文本：JSON 对象视为结构化凭据，其余按原始字符串处理
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if text.starts_with('{') {
            if let Ok(map) = serde_json::from_str::<BTreeMap<String, Value>>(text) {
                let pairs = map
                    .into_iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, v)
                    })
                    .collect();
                return Some(Self::Pairs(pairs));
            }
            debug!("Cookie 文本看起来像 JSON 但解析失败，按原始字符串处理");
        }

        Some(Self::Raw(text.to_string()))
    }

    /// 从文件中加载 Cookie，文件不存在或为空时返回 None
    pub async fn load(path: &Path) -> Option<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let credential = Self::parse(&text);
                if credential.is_none() {
                    warn!("Cookie文件为空: {:?}", path);
                }
                credential
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Cookie文件未找到: {:?}，将以未登录状态访问", path);
                None
            }
            Err(e) => {
                warn!("读取Cookie文件失败: {}", e);
                None
            }
        }
    }

    pub fn pairs(&self) -> Vec<(String, String)> {
        match self {
            Self::Raw(raw) => Cookie::split_parse(raw.as_str())
                .filter_map(|c| c.ok())
                .map(|c| (c.name().to_string(), c.value().to_string()))
                .collect(),
            Self::Pairs(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// 生成 Cookie 请求头
    pub fn header_value(&self) -> String {
        self.pairs()
            .into_iter()
            .map(|(k, v)| Cookie::new(k, v).to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
