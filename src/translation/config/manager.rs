//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 页面渲染模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// 阻塞翻译缓存未命中的片段
    Immediate,
    /// 先返回原文，后台翻译，客户端轮询
    #[default]
    Deferred,
}

impl FromStr for RenderMode {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "immediate" => Ok(RenderMode::Immediate),
            "deferred" => Ok(RenderMode::Deferred),
            other => Err(TranslationError::ConfigError(format!("未知的渲染模式: {}", other))),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderMode::Immediate => write!(f, "immediate"),
            RenderMode::Deferred => write!(f, "deferred"),
        }
    }
}

/// 翻译配置
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationConfig {
    // 基础配置
    pub enabled: bool,
    pub source_lang: String,
    pub site_id: String,
    pub api_url: String,
    pub api_key: Option<String>,
    /// 传给翻译服务的风格提示
    pub style: Option<String>,

    // 请求配置
    pub max_batch_items: usize,
    pub max_batch_chars: usize,
    pub timeout_secs: u64,
    pub max_concurrent_requests: usize,

    // 进行中记录
    pub inflight_cleanup_interval_secs: u64,
    pub inflight_max_age_secs: u64,

    // 占位符保护
    pub skip_words: Vec<String>,
    pub protect_numbers: bool,
    pub strict_placeholders: bool,

    // 渲染与客户端
    pub render_mode: RenderMode,
    pub deferred_initial_delay_ms: u64,
    pub deferred_poll_interval_ms: u64,
    pub deferred_max_polls: u32,
    pub recovery_window_ms: u64,

    // 缓存配置
    pub hot_cache_size: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            site_id: constants::DEFAULT_SITE_ID.to_string(),
            api_url: constants::DEFAULT_API_URL.to_string(),
            api_key: None,
            style: None,

            max_batch_items: constants::MAX_BATCH_ITEMS,
            max_batch_chars: constants::MAX_BATCH_CHARS,
            timeout_secs: constants::DEFAULT_TRANSLATE_TIMEOUT.as_secs(),
            max_concurrent_requests: constants::DEFAULT_MAX_CONCURRENT_REQUESTS,

            inflight_cleanup_interval_secs: constants::INFLIGHT_CLEANUP_INTERVAL.as_secs(),
            inflight_max_age_secs: constants::INFLIGHT_MAX_AGE.as_secs(),

            skip_words: Vec::new(),
            protect_numbers: true,
            strict_placeholders: false,

            render_mode: RenderMode::default(),
            deferred_initial_delay_ms: constants::DEFERRED_INITIAL_DELAY.as_millis() as u64,
            deferred_poll_interval_ms: constants::DEFERRED_POLL_INTERVAL.as_millis() as u64,
            deferred_max_polls: constants::DEFERRED_MAX_POLLS,
            recovery_window_ms: constants::RECOVERY_WINDOW.as_millis() as u64,

            hot_cache_size: constants::DEFAULT_HOT_CACHE_SIZE,
        }
    }
}

impl TranslationConfig {
    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.max_batch_items == 0 || self.max_batch_items > constants::MAX_BATCH_ITEMS {
            return Err(TranslationError::ConfigError(format!(
                "单次请求条目数必须在 1..={} 之间",
                constants::MAX_BATCH_ITEMS
            )));
        }

        if self.max_batch_chars == 0 || self.max_batch_chars > constants::MAX_BATCH_CHARS {
            return Err(TranslationError::ConfigError(format!(
                "单次请求字符数必须在 1..={} 之间",
                constants::MAX_BATCH_CHARS
            )));
        }

        if self.max_concurrent_requests == 0 {
            return Err(TranslationError::ConfigError("最大并发数不能为0".to_string()));
        }

        if self.timeout_secs == 0 {
            return Err(TranslationError::ConfigError("超时时间不能为0".to_string()));
        }

        if self.inflight_max_age_secs < self.inflight_cleanup_interval_secs {
            return Err(TranslationError::ConfigError(
                "进行中记录的最大存活时间不能小于清理间隔".to_string(),
            ));
        }

        if self.site_id.is_empty() || self.site_id.contains(':') {
            return Err(TranslationError::ConfigError(
                "站点标识不能为空且不能包含 ':'".to_string(),
            ));
        }

        if self.deferred_max_polls == 0 {
            return Err(TranslationError::ConfigError("轮询次数不能为0".to_string()));
        }

        if self.hot_cache_size == 0 {
            return Err(TranslationError::ConfigError("热缓存大小不能为0".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{translation, EnvVar};

        if let Ok(enabled) = translation::Enabled::get() {
            self.enabled = enabled;
        }

        if let Ok(source_lang) = translation::SourceLang::get() {
            self.source_lang = source_lang;
        }

        if let Ok(site_id) = translation::SiteId::get() {
            self.site_id = site_id;
        }

        if let Ok(api_url) = translation::ApiUrl::get() {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Ok(api_key) = translation::ApiKey::get() {
            self.api_key = Some(api_key).filter(|key| !key.is_empty());
        }

        if let Ok(max_concurrent) = translation::MaxConcurrentRequests::get() {
            self.max_concurrent_requests = max_concurrent;
        }

        if let Ok(items) = translation::BatchMaxItems::get() {
            self.max_batch_items = items;
        }

        if let Ok(chars) = translation::BatchMaxChars::get() {
            self.max_batch_chars = chars;
        }

        if let Ok(timeout) = translation::Timeout::get() {
            self.timeout_secs = timeout.as_secs();
        }

        if let Ok(words) = translation::SkipWords::get() {
            self.skip_words = words;
        }

        if let Ok(strict) = translation::StrictPlaceholders::get() {
            self.strict_placeholders = strict;
        }

        if let Ok(mode) = translation::RenderMode::get() {
            if let Ok(mode) = mode.parse() {
                self.render_mode = mode;
            }
        }
    }

    /// 转换为Duration类型
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn inflight_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.inflight_cleanup_interval_secs)
    }

    pub fn inflight_max_age(&self) -> Duration {
        Duration::from_secs(self.inflight_max_age_secs)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslationConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new() -> TranslationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件创建，仍然应用环境变量覆盖
    pub fn from_path(path: &str) -> TranslationResult<Self> {
        Self::load_dotenv();
        let expanded = shellexpand::tilde(path);
        let mut config = Self::load_from_file(&expanded)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslationConfig {
        &self.config
    }

    pub fn into_config(self) -> TranslationConfig {
        self.config
    }

    /// 从文件加载配置
    fn load_config() -> TranslationResult<TranslationConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(TranslationConfig::default())
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &str) -> TranslationResult<TranslationConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        Self::parse_config(path, &content)
    }

    /// 按扩展名解析配置内容
    fn parse_config(path: &str, content: &str) -> TranslationResult<TranslationConfig> {
        if path.ends_with(".toml") {
            toml::from_str(content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let config = TranslationConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TranslationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_batch_items, 128);
        assert_eq!(config.max_batch_chars, 30_000);
        assert_eq!(config.inflight_cleanup_interval(), Duration::from_secs(60));
        assert_eq!(config.inflight_max_age(), Duration::from_secs(300));
    }

    #[test]
    fn test_validate_rejects_oversized_batches() {
        let mut config = TranslationConfig::default();
        config.max_batch_items = 129;
        assert!(matches!(config.validate(), Err(TranslationError::ConfigError(_))));

        let mut config = TranslationConfig::default();
        config.site_id = "a:b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ConfigManager::parse_config(
            "lingo-relay.toml",
            r#"
source_lang = "de"
skip_words = ["eBay"]
render_mode = "immediate"
"#,
        )
        .unwrap();

        assert_eq!(config.source_lang, "de");
        assert_eq!(config.skip_words, vec!["eBay".to_string()]);
        assert_eq!(config.render_mode, RenderMode::Immediate);
        assert_eq!(config.max_batch_items, constants::MAX_BATCH_ITEMS);
    }

    #[test]
    fn test_json_config() {
        let config =
            ConfigManager::parse_config("config.json", r#"{"site_id": "shop", "timeout_secs": 5}"#)
                .unwrap();
        assert_eq!(config.site_id, "shop");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_render_mode_parse() {
        assert_eq!("Deferred".parse::<RenderMode>().unwrap(), RenderMode::Deferred);
        assert!("later".parse::<RenderMode>().is_err());
        assert_eq!(RenderMode::Immediate.to_string(), "immediate");
    }
}
