//! # lingo-relay
//!
//! 网站翻译中继：把源语言页面渲染为目标语言页面，缓存译文，
//! 对尚未翻译的内容在后台补齐，并在浏览器端协调客户端重新渲染。
//!
//! ## 模块组织
//!
//! - `parsers` - HTML 解析、DOM 能力接口和同源链接重写
//! - `translation` - 片段提取、占位符保护、翻译引擎和页面服务
//! - `reconcile` - 客户端恢复模式和延迟模式的状态机、浏览器脚本
//! - `env` - 环境变量
//! - `web` - HTTP 服务（可选）

pub mod env;
pub mod parsers;
pub mod reconcile;
pub mod translation;
#[cfg(feature = "web")]
pub mod web;

pub use translation::{
    PageRequest, RenderMode, RenderedPage, TranslationConfig, TranslationError, TranslationResult,
    TranslationService,
};
