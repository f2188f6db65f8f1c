//! 客户端脚本
//!
//! `assets/reconcile.js` 是唯一的脚本源码，服务时去掉注释和缩进后输出。
//! 压缩只处理整行注释和块注释，不改写代码本身。

use std::sync::OnceLock;

use crate::translation::config::constants::SCRIPT_PATH;
use crate::translation::config::TranslationConfig;

/// 脚本源码
pub const SOURCE: &str = include_str!("../../assets/reconcile.js");

static MINIFIED: OnceLock<String> = OnceLock::new();

/// 交付给浏览器的脚本
pub fn script() -> &'static str {
    MINIFIED.get_or_init(|| minify(SOURCE))
}

/// 去掉注释、缩进和空行
pub fn minify(source: &str) -> String {
    let mut out = Vec::new();
    let mut in_block_comment = false;

    for line in source.lines() {
        let trimmed = line.trim();

        if in_block_comment {
            if trimmed.ends_with("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if trimmed.starts_with("/*") {
            in_block_comment = !trimmed.ends_with("*/");
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        out.push(trimmed);
    }

    out.join("\n")
}

/// 页面中引用脚本的标签属性
pub fn script_attributes(config: &TranslationConfig, lang: &str, lookup: &str) -> Vec<(String, String)> {
    vec![
        ("src".to_string(), SCRIPT_PATH.to_string()),
        ("defer".to_string(), String::new()),
        ("data-lang".to_string(), lang.to_string()),
        ("data-lookup".to_string(), lookup.to_string()),
        (
            "data-recovery-window".to_string(),
            config.recovery_window_ms.to_string(),
        ),
        (
            "data-initial-delay".to_string(),
            config.deferred_initial_delay_ms.to_string(),
        ),
        (
            "data-poll-interval".to_string(),
            config.deferred_poll_interval_ms.to_string(),
        ),
        (
            "data-max-polls".to_string(),
            config.deferred_max_polls.to_string(),
        ),
    ]
}

/// 防闪烁样式：在恢复窗口内隐藏页面，到时通过动画自动显示
pub fn guard_css(window_ms: u64) -> String {
    format!(
        "body{{visibility:hidden;animation:lingo-reveal 0s linear {}ms forwards}}\
         @keyframes lingo-reveal{{to{{visibility:visible}}}}",
        window_ms
    )
}
