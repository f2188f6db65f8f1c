//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量管理。所有变量以 `LINGO_` 为前缀。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "LINGO_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// 翻译功能启用状态
    pub struct Enabled;
    impl EnvVar<bool> for Enabled {
        const NAME: &'static str = "LINGO_TRANSLATION_ENABLED";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Enable translation functionality";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }

    /// 源语言
    pub struct SourceLang;
    impl EnvVar<String> for SourceLang {
        const NAME: &'static str = "LINGO_SOURCE_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Source language of origin pages (ISO 639-1 code)";

        fn parse(value: &str) -> EnvResult<String> {
            parse_lang(value, Self::NAME)
        }
    }

    /// 站点标识，用于缓存键和进行中键
    pub struct SiteId;
    impl EnvVar<String> for SiteId {
        const NAME: &'static str = "LINGO_SITE_ID";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Site identifier used in cache and in-flight keys";

        fn parse(value: &str) -> EnvResult<String> {
            let site = value.trim();
            if site.is_empty() || site.contains(':') {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Site id must be non-empty and must not contain ':'".to_string(),
                });
            }
            Ok(site.to_string())
        }
    }

    /// API URL
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "LINGO_TRANSLATION_API_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Translation API endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// API 密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "LINGO_TRANSLATION_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Bearer token sent to the translation API";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.trim().to_string())
        }
    }

    /// 最大并发请求数
    pub struct MaxConcurrentRequests;
    impl EnvVar<usize> for MaxConcurrentRequests {
        const NAME: &'static str = "LINGO_MAX_CONCURRENT_REQUESTS";
        const DEFAULT: Option<usize> = Some(8);
        const DESCRIPTION: &'static str = "Maximum concurrent chunk requests per page";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 100)
        }
    }

    /// 单次请求最大条目数
    pub struct BatchMaxItems;
    impl EnvVar<usize> for BatchMaxItems {
        const NAME: &'static str = "LINGO_BATCH_MAX_ITEMS";
        const DEFAULT: Option<usize> = Some(128);
        const DESCRIPTION: &'static str = "Maximum strings per translation request";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 128)
        }
    }

    /// 单次请求最大字符数
    pub struct BatchMaxChars;
    impl EnvVar<usize> for BatchMaxChars {
        const NAME: &'static str = "LINGO_BATCH_MAX_CHARS";
        const DEFAULT: Option<usize> = Some(30_000);
        const DESCRIPTION: &'static str = "Maximum characters per translation request";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 100, 30_000)
        }
    }

    /// 上游翻译超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "LINGO_TRANSLATION_TIMEOUT";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(10));
        const DESCRIPTION: &'static str = "Upstream translation timeout in seconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            let seconds: u64 = value.parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid number of seconds".to_string(),
            })?;

            if seconds == 0 || seconds > 60 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Timeout must be between 1 and 60 seconds".to_string(),
                });
            }

            Ok(Duration::from_secs(seconds))
        }
    }

    /// 品牌词列表（逗号分隔）
    pub struct SkipWords;
    impl EnvVar<Vec<String>> for SkipWords {
        const NAME: &'static str = "LINGO_SKIP_WORDS";
        const DEFAULT: Option<Vec<String>> = None;
        const DESCRIPTION: &'static str = "Comma-separated brand terms that are never translated";

        fn parse(value: &str) -> EnvResult<Vec<String>> {
            Ok(value
                .split(',')
                .map(|word| word.trim())
                .filter(|word| !word.is_empty())
                .map(|word| word.to_string())
                .collect())
        }
    }

    /// 默认渲染模式
    pub struct RenderMode;
    impl EnvVar<String> for RenderMode {
        const NAME: &'static str = "LINGO_RENDER_MODE";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Default render mode: immediate, deferred";

        fn parse(value: &str) -> EnvResult<String> {
            match value.trim().to_lowercase().as_str() {
                "immediate" => Ok("immediate".to_string()),
                "deferred" => Ok("deferred".to_string()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!("Invalid mode '{}'. Use: immediate, deferred", value),
                }),
            }
        }
    }

    /// 严格占位符模式
    pub struct StrictPlaceholders;
    impl EnvVar<bool> for StrictPlaceholders {
        const NAME: &'static str = "LINGO_STRICT_PLACEHOLDERS";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Fail immediate translation on placeholder violations";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// Web服务器相关环境变量
pub mod web {
    use super::*;

    /// 绑定地址
    pub struct BindAddress;
    impl EnvVar<String> for BindAddress {
        const NAME: &'static str = "LINGO_WEB_BIND_ADDRESS";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Web server bind address";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("127.0.0.1".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            let addr = value.trim();
            if addr.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Address cannot be empty".to_string(),
                });
            }
            Ok(addr.to_string())
        }
    }

    /// 端口
    pub struct Port;
    impl EnvVar<u16> for Port {
        const NAME: &'static str = "LINGO_WEB_PORT";
        const DEFAULT: Option<u16> = Some(7080);
        const DESCRIPTION: &'static str = "Web server port";

        fn parse(value: &str) -> EnvResult<u16> {
            value.trim().parse().map_err(|_| EnvError {
                variable: Self::NAME.to_string(),
                message: "Must be a valid port number (1-65535)".to_string(),
            })
        }
    }

    /// 静态文件目录
    pub struct StaticDir;
    impl EnvVar<String> for StaticDir {
        const NAME: &'static str = "LINGO_WEB_STATIC_DIR";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Static files directory";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.trim().to_string())
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_lang(value: &str, var_name: &str) -> EnvResult<String> {
    let lang = value.trim().to_lowercase();
    let valid = match lang.split_once('-') {
        Some((primary, region)) => primary.len() == 2 && (2..=4).contains(&region.len()),
        None => lang.len() == 2,
    };
    if !valid || !lang.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: "Language code must look like 'en' or 'pt-br'".to_string(),
        });
    }
    Ok(lang)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        assert!(translation::Enabled::parse("true").unwrap());
        assert!(translation::Enabled::parse("1").unwrap());
        assert!(translation::Enabled::parse("YES").unwrap());
        assert!(!translation::Enabled::parse("off").unwrap());

        assert!(translation::Enabled::parse("maybe").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(translation::ApiUrl::parse("http://localhost:1188").is_ok());
        assert!(translation::ApiUrl::parse("https://api.example.com").is_ok());

        assert!(translation::ApiUrl::parse("ftp://example.com").is_err());
        assert!(translation::ApiUrl::parse("not-a-url").is_err());
    }

    #[test]
    fn test_batch_limits_are_capped() {
        assert_eq!(translation::BatchMaxItems::parse("64").unwrap(), 64);
        assert!(translation::BatchMaxItems::parse("129").is_err());
        assert!(translation::BatchMaxChars::parse("30001").is_err());
        assert!(translation::BatchMaxChars::parse("abc").is_err());
    }

    #[test]
    fn test_skip_words_list() {
        let words = translation::SkipWords::parse(" eBay, Find-Your-Item ,,").unwrap();
        assert_eq!(words, vec!["eBay".to_string(), "Find-Your-Item".to_string()]);
    }

    #[test]
    fn test_lang_and_mode_parsing() {
        assert_eq!(translation::SourceLang::parse("EN").unwrap(), "en");
        assert_eq!(translation::SourceLang::parse("pt-BR").unwrap(), "pt-br");
        assert!(translation::SourceLang::parse("english").is_err());

        assert_eq!(translation::RenderMode::parse("Deferred").unwrap(), "deferred");
        assert!(translation::RenderMode::parse("later").is_err());
        assert!(translation::SiteId::parse("a:b").is_err());
    }
}
