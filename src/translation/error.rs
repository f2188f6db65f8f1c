//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。页面渲染路径上的错误会降级为
//! "该片段显示原文"，只有簿记类错误（缓存写入、用量记录）会被记录后吞掉。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 片段数量或顺序与文档遍历不一致
    #[error("片段错位: {0}")]
    ExtractionMismatch(String),

    /// 译文中的占位符缺失、多余或嵌套错误
    #[error("占位符校验失败: {0}")]
    PlaceholderViolation(String),

    /// 上游翻译服务错误（配额、格式错误的响应等）
    #[error("翻译服务错误: {0}")]
    TranslationServiceError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 缓存写入错误
    #[error("缓存写入错误: {0}")]
    CacheWriteError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 并发错误
    #[error("并发操作错误: {0}")]
    ConcurrencyError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    ///
    /// 服务端从不自动重试；这里的判断只影响日志级别和客户端轮询的预期。
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::TranslationServiceError(_) => true,
            TranslationError::CacheWriteError(_) => true,
            TranslationError::ConcurrencyError(_) => true,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::ExtractionMismatch(_) => false,
            TranslationError::PlaceholderViolation(_) => false,
            TranslationError::ParseError(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::ExtractionMismatch(_) => ErrorSeverity::Error,
            TranslationError::PlaceholderViolation(_) => ErrorSeverity::Warning,
            TranslationError::TranslationServiceError(_) => ErrorSeverity::Error,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::CacheWriteError(_) => ErrorSeverity::Warning,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::ConcurrencyError(_) => ErrorSeverity::Warning,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::ExtractionMismatch(_) => ErrorCategory::Extraction,
            TranslationError::PlaceholderViolation(_) => ErrorCategory::Placeholder,
            TranslationError::TranslationServiceError(_) => ErrorCategory::Service,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::CacheWriteError(_) => ErrorCategory::Cache,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::ParseError(_) => ErrorCategory::Parsing,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::ConcurrencyError(_) => ErrorCategory::Concurrency,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 按严重程度选择日志级别记录错误
    pub fn log(&self, context: &str) {
        match self.severity() {
            ErrorSeverity::Info => tracing::info!("{}: {}", context, self),
            ErrorSeverity::Warning => tracing::warn!("{}: {}", context, self),
            ErrorSeverity::Error => tracing::error!("{}: {}", context, self),
            ErrorSeverity::Critical => tracing::error!("{} (严重): {}", context, self),
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = match &self {
            TranslationError::ConfigError(msg)
            | TranslationError::InvalidInput(msg)
            | TranslationError::ExtractionMismatch(msg)
            | TranslationError::PlaceholderViolation(msg)
            | TranslationError::TranslationServiceError(msg)
            | TranslationError::TimeoutError(msg)
            | TranslationError::CacheWriteError(msg)
            | TranslationError::NetworkError(msg)
            | TranslationError::ParseError(msg)
            | TranslationError::SerializationError(msg)
            | TranslationError::ConcurrencyError(msg)
            | TranslationError::InternalError(msg) => format!("{} (上下文: {})", msg, context),
        };

        match &mut self {
            TranslationError::ConfigError(ref mut msg)
            | TranslationError::InvalidInput(ref mut msg)
            | TranslationError::ExtractionMismatch(ref mut msg)
            | TranslationError::PlaceholderViolation(ref mut msg)
            | TranslationError::TranslationServiceError(ref mut msg)
            | TranslationError::TimeoutError(ref mut msg)
            | TranslationError::CacheWriteError(ref mut msg)
            | TranslationError::NetworkError(ref mut msg)
            | TranslationError::ParseError(ref mut msg)
            | TranslationError::SerializationError(ref mut msg)
            | TranslationError::ConcurrencyError(ref mut msg)
            | TranslationError::InternalError(ref mut msg) => *msg = new_msg,
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Extraction,
    Placeholder,
    Service,
    Timeout,
    Cache,
    Network,
    Parsing,
    Serialization,
    Concurrency,
    Internal,
}

/// 标准错误转换
impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::NetworkError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for TranslationError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        TranslationError::TimeoutError(format!("异步操作超时: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(format!("上游请求超时: {}", error))
        } else if error.is_decode() {
            TranslationError::TranslationServiceError(format!("上游响应格式错误: {}", error))
        } else {
            TranslationError::NetworkError(format!("上游请求失败: {}", error))
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;
