//! 客户端轮询的查询接口

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json as ExtractJson, Query, State},
    response::Json,
};
use tracing::debug;

use super::{error_response, ApiError};
use crate::web::types::{AppState, LookupQuery, LookupRequest};

/// 返回已经有译文的哈希，其余哈希不出现在结果中
pub async fn lookup_translations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LookupQuery>,
    ExtractJson(request): ExtractJson<LookupRequest>,
) -> Result<Json<HashMap<String, String>>, ApiError> {
    debug!("查询 {} 个待翻译片段 ({})", request.segments.len(), query.lang);

    state
        .service
        .lookup(&query.lang, query.site.as_deref(), &request.segments)
        .await
        .map(Json)
        .map_err(error_response)
}
