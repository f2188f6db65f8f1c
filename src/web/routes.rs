//! Web 路由定义

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::translation::constants::{LOOKUP_PATH, SCRIPT_PATH};
use crate::web::{handlers::*, types::AppState};

/// 创建路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(LOOKUP_PATH, post(lookup_translations))
        .route("/api/render", post(render_page))
        .route(SCRIPT_PATH, get(reconcile_script))
        .route("/health", get(health))
}
