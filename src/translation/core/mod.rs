//! 翻译核心模块
//!
//! - **服务层** (`service.rs`): 页面渲染和客户端查询的统一入口
//! - **引擎层** (`engine.rs`): 即时翻译、后台翻译和上游并发控制
//! - **翻译接口** (`translator.rs`): 上游翻译服务的抽象和 HTTP 实现
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── PlaceholderCodec (pipeline/placeholder.rs)
//!     ├── walker (pipeline/walker.rs)
//!     └── TranslationEngine (engine.rs)
//!             ├── Translator (translator.rs)
//!             ├── SegmentStore (storage/store.rs)
//!             └── InFlightStore (storage/inflight.rs)
//! ```

pub mod engine;
pub mod service;
pub mod translator;

pub use engine::{
    normalize_pathname, BackgroundTask, BackgroundUnit, EngineStats, EngineStatsSnapshot,
    ImmediateOutcome, TranslationContext, TranslationEngine,
};
pub use service::{
    HealthLevel, HealthStatus, PageRequest, RenderStats, RenderedPage, ServiceStats,
    ServiceStatsSnapshot, TranslationService,
};
pub use translator::{
    HttpTranslator, ItemType, TranslateItem, TranslateRequest, TranslateResponse, Translator, Usage,
};
