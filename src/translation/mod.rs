//! 翻译模块
//!
//! - **core**: 页面翻译服务、翻译引擎和上游翻译接口
//! - **pipeline**: 片段提取、占位符保护、去重分批和回写
//! - **storage**: 译文存储和进行中记录
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use lingo_relay::translation::{ConfigManager, PageRequest, TranslationService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::new()?.into_config();
//! let service = TranslationService::from_config(config)?;
//!
//! let page = service
//!     .render_page(PageRequest::new("<p>Hello <b>world</b></p>", "es"))
//!     .await?;
//! println!("{}", page.html);
//! # Ok(())
//! # }
//! ```

/// 配置管理模块
///
/// 提供上游服务、分批限制、占位符保护和客户端时序等配置
pub mod config;

/// 核心翻译模块
///
/// 包含页面服务、翻译引擎和上游翻译接口
pub mod core;

/// 错误处理模块
pub mod error;

/// 文本处理管道模块
///
/// 负责从文档中提取片段、保护占位符、去重分批并把结果写回
pub mod pipeline;

/// 存储模块
pub mod storage;

pub use config::{constants, ConfigManager, RenderMode, TranslationConfig};
pub use core::{
    HealthLevel, HealthStatus, PageRequest, RenderStats, RenderedPage, ServiceStats,
    TranslationEngine, TranslationService, Translator,
};
pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};
pub use pipeline::{PendingSegment, PlaceholderCodec, Segment, SegmentKind};
pub use storage::{InFlightStore, MemoryStore, SegmentStore};

/// 模块版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
