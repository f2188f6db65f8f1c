//! Web 模块的数据类型定义

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::translation::{PendingSegment, RenderMode, RenderStats, TranslationService};

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TranslationService>,
}

impl AppState {
    pub fn new(service: TranslationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// 查询接口的地址参数
#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub lang: String,
    pub site: Option<String>,
}

/// 查询接口的请求体
#[derive(Debug, Deserialize, Serialize)]
pub struct LookupRequest {
    #[serde(default)]
    pub segments: Vec<PendingSegment>,
}

/// 页面渲染请求
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub html: String,
    pub lang: String,
    pub pathname: Option<String>,
    /// 页面所在的源，例如 `https://shop.example`
    pub origin: Option<String>,
    pub mode: Option<RenderMode>,
    pub site_id: Option<String>,
}

/// 页面渲染响应
#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub html: String,
    pub pending: Vec<PendingSegment>,
    pub stats: RenderStats,
    pub mode: RenderMode,
}

/// 错误响应
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// 同样的请求稍后重试可能成功
    #[serde(default)]
    pub retryable: bool,
}
