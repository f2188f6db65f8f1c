//! 翻译配置管理模块
//!
//! 提供配置管理，支持环境变量、配置文件和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, RenderMode, TranslationConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 批次处理相关
    pub const MAX_BATCH_ITEMS: usize = 128;
    pub const MAX_BATCH_CHARS: usize = 30_000;

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";
    pub const DEFAULT_SOURCE_LANG: &str = "en";
    pub const DEFAULT_SITE_ID: &str = "default";
    pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;
    pub const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_secs(10);

    // 进行中记录
    pub const INFLIGHT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
    pub const INFLIGHT_MAX_AGE: Duration = Duration::from_secs(300);

    // 客户端协调
    pub const RECOVERY_WINDOW: Duration = Duration::from_millis(2000);
    pub const DEFERRED_INITIAL_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFERRED_POLL_INTERVAL: Duration = Duration::from_millis(2000);
    pub const DEFERRED_MAX_POLLS: u32 = 10;

    // 本地缓存
    pub const DEFAULT_HOT_CACHE_SIZE: usize = 1000;

    // 可翻译属性，遍历时按此顺序检查
    pub const TRANSLATABLE_ATTRS: &[&str] = &["title", "placeholder", "aria-label", "alt"];

    // 跳过的元素，内容原样保留
    pub const SKIP_ELEMENTS: &[&str] = &["script", "style", "noscript", "textarea", "code"];

    // 块级容器
    pub const BLOCK_ELEMENTS: &[&str] = &[
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "td", "th", "dt", "dd",
        "blockquote", "figcaption", "caption", "label", "button", "summary", "legend",
    ];

    // 行内元素
    pub const INLINE_ELEMENTS: &[&str] = &[
        "a", "b", "strong", "em", "i", "span", "small", "mark", "sup", "sub", "u", "s",
        "abbr", "cite", "q", "time", "del", "ins", "kbd", "var", "bdi", "bdo",
    ];

    // 行内空元素
    pub const VOID_INLINE_ELEMENTS: &[&str] = &["br", "img", "wbr"];

    // 页面标记
    pub const SKIP_CLASS: &str = "notranslate";
    pub const SKIP_ATTR: &str = "data-lingo-skip";
    pub const HASH_ATTR: &str = "data-lingo-hash";
    pub const ATTR_MARKER_PREFIX: &str = "data-lingo-attr-";
    pub const PENDING_CLASS: &str = "lingo-pending";
    pub const DICTIONARY_ID: &str = "lingo-dictionary";
    pub const PENDING_ID: &str = "lingo-pending";
    pub const GUARD_ID: &str = "lingo-guard";

    // 路由
    pub const LOOKUP_PATH: &str = "/translate-lookup";
    pub const SCRIPT_PATH: &str = "/__lingo/reconcile.js";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "lingo-relay.toml",
        "config.toml",
        ".lingo-relay.toml",
        "~/.config/lingo-relay/config.toml",
        "/etc/lingo-relay/config.toml",
    ];
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}

/// 加载配置，失败时回退到默认值
pub fn load_translation_config() -> TranslationConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.get_config().clone(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            TranslationConfig::default()
        }
    }
}
