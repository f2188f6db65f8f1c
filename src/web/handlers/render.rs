//! 页面渲染接口

use std::sync::Arc;

use axum::{
    extract::{Json as ExtractJson, State},
    response::Json,
};
use url::Url;

use super::{bad_request, error_response, ApiError};
use crate::translation::PageRequest;
use crate::web::types::{AppState, RenderRequest, RenderResponse};

/// 渲染一个页面，后台翻译在响应返回后继续进行
pub async fn render_page(
    State(state): State<Arc<AppState>>,
    ExtractJson(request): ExtractJson<RenderRequest>,
) -> Result<Json<RenderResponse>, ApiError> {
    let mut page = PageRequest::new(request.html, request.lang);

    if let Some(origin) = request.origin.as_deref().filter(|o| !o.trim().is_empty()) {
        let origin = Url::parse(origin.trim())
            .map_err(|e| bad_request(format!("无效的 origin {:?}: {}", origin, e)))?;
        page = page.with_origin(origin);
    }
    if let Some(pathname) = request.pathname {
        page = page.with_pathname(pathname);
    }
    if let Some(mode) = request.mode {
        page = page.with_mode(mode);
    }
    if let Some(site_id) = request.site_id {
        page = page.with_site(site_id);
    }

    let rendered = state.service.render_page(page).await.map_err(error_response)?;

    Ok(Json(RenderResponse {
        html: rendered.html,
        pending: rendered.pending,
        stats: rendered.stats,
        mode: rendered.mode,
    }))
}
