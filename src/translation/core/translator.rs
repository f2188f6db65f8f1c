//! 上游翻译能力
//!
//! 引擎只依赖 [`Translator`] 这一接口；[`HttpTranslator`] 是通过 HTTP JSON
//! 调用外部翻译服务的默认实现。调用方负责遵守单次请求 128 条 / 30 000
//! 字符的限制，实现方再检查一次并校验返回数量。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::translation::config::TranslationConfig;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::BatchLimits;

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Segment,
    Pathname,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateItem {
    pub text: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl TranslateItem {
    pub fn segment(text: impl Into<String>, style: Option<String>) -> Self {
        Self {
            text: text.into(),
            item_type: ItemType::Segment,
            style,
        }
    }

    pub fn pathname(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            item_type: ItemType::Pathname,
            style: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub items: Vec<TranslateItem>,
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslateRequest {
    pub fn total_chars(&self) -> usize {
        self.items.iter().map(|item| item.text.chars().count()).sum()
    }

    /// 检查请求是否满足尺寸限制
    pub fn check_limits(&self, limits: &BatchLimits) -> TranslationResult<()> {
        if self.items.len() > limits.max_items {
            return Err(TranslationError::InvalidInput(format!(
                "单次请求条目数 {} 超过上限 {}",
                self.items.len(),
                limits.max_items
            )));
        }
        // 单条超长的字符串独占一个请求，不做拆分
        let chars = self.total_chars();
        if self.items.len() > 1 && chars > limits.max_chars {
            return Err(TranslationError::InvalidInput(format!(
                "单次请求字符数 {} 超过上限 {}",
                chars, limits.max_chars
            )));
        }
        Ok(())
    }
}

/// 用量计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub characters: u64,
    pub requests: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.characters += other.characters;
        self.requests += other.requests;
    }

    pub fn merged(mut self, other: &Usage) -> Self {
        self.add(other);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Usage::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateResponse {
    /// 与请求条目一一对应的译文
    pub texts: Vec<String>,
    pub usage: Usage,
}

/// 翻译能力接口
#[async_trait]
pub trait Translator: Send + Sync {
    /// 翻译一组条目，返回同样数量、同样顺序的译文
    async fn translate(&self, request: TranslateRequest) -> TranslationResult<TranslateResponse>;
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    items: &'a [TranslateItem],
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    translations: Vec<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

/// 通过 HTTP JSON 接口调用外部翻译服务
pub struct HttpTranslator {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    limits: BatchLimits,
}

impl HttpTranslator {
    pub fn new(config: &TranslationConfig) -> TranslationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            limits: BatchLimits::from_config(config),
        })
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    async fn translate(&self, request: TranslateRequest) -> TranslationResult<TranslateResponse> {
        if request.items.is_empty() {
            return Ok(TranslateResponse {
                texts: Vec::new(),
                usage: Usage::default(),
            });
        }
        request.check_limits(&self.limits)?;

        debug!(
            "请求翻译 {} 条 ({} 字符) {} -> {}",
            request.items.len(),
            request.total_chars(),
            request.source_lang,
            request.target_lang
        );

        let body = ApiRequest {
            items: &request.items,
            source_lang: &request.source_lang,
            target_lang: &request.target_lang,
        };

        let mut builder = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TranslationError::TranslationServiceError(format!(
                "翻译API返回 {}: {}",
                status, body_text
            )));
        }

        let parsed: ApiResponse = response.json().await?;
        if parsed.translations.len() != request.items.len() {
            return Err(TranslationError::TranslationServiceError(format!(
                "翻译API返回 {} 条译文，请求了 {} 条",
                parsed.translations.len(),
                request.items.len()
            )));
        }

        let usage = parsed.usage.unwrap_or(Usage {
            characters: request.total_chars() as u64,
            requests: 1,
            ..Usage::default()
        });

        Ok(TranslateResponse {
            texts: parsed.translations,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_wire_format() {
        let item = TranslateItem::segment("Hello [B1]world[/B1]", Some("formal".to_string()));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "segment");
        assert_eq!(json["style"], "formal");

        let json = serde_json::to_value(TranslateItem::pathname("/about")).unwrap();
        assert_eq!(json["type"], "pathname");
        assert!(json.get("style").is_none());
    }

    #[test]
    fn test_check_limits() {
        let limits = BatchLimits {
            max_items: 2,
            max_chars: 10,
        };
        let request = |texts: &[&str]| TranslateRequest {
            items: texts.iter().map(|t| TranslateItem::segment(*t, None)).collect(),
            source_lang: "en".to_string(),
            target_lang: "es".to_string(),
        };

        assert!(request(&["abc", "def"]).check_limits(&limits).is_ok());
        assert!(request(&["a", "b", "c"]).check_limits(&limits).is_err());
        assert!(request(&["abcdef", "ghijkl"]).check_limits(&limits).is_err());
        // 超长的单条允许通过
        assert!(request(&["a very long single string"]).check_limits(&limits).is_ok());
    }

    #[test]
    fn test_usage_merge() {
        let a = Usage {
            input_tokens: 3,
            requests: 1,
            ..Usage::default()
        };
        let b = Usage {
            input_tokens: 2,
            characters: 10,
            requests: 1,
            ..Usage::default()
        };
        let total = a.merged(&b);
        assert_eq!(total.input_tokens, 5);
        assert_eq!(total.characters, 10);
        assert_eq!(total.requests, 2);
        assert!(Usage::default().is_empty());

        let parsed: Usage = serde_json::from_str(r#"{"output_tokens": 7}"#).unwrap();
        assert_eq!(parsed.output_tokens, 7);
    }
}
