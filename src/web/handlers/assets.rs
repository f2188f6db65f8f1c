//! 脚本和健康检查

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};

use crate::reconcile::script::script;
use crate::translation::{HealthLevel, HealthStatus};
use crate::web::types::AppState;

/// 客户端协调脚本
pub async fn reconcile_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        script(),
    )
}

/// 健康检查，不健康时返回 503
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.service.get_health();
    let code = if status.overall == HealthLevel::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(status))
}
