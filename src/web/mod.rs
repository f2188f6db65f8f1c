//! Web 服务器模块
//!
//! 提供页面渲染、客户端查询接口和协调脚本

pub mod config;
pub mod handlers;
pub mod routes;
pub mod types;

pub use config::WebConfig;
pub use routes::create_routes;
pub use types::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::translation::{TranslationError, TranslationResult, TranslationService};

/// Web 服务器
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: WebConfig, service: TranslationService) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new(service)),
        }
    }

    /// 启动 Web 服务器
    pub async fn start(&self) -> TranslationResult<()> {
        let app = create_router(Arc::clone(&self.state), &self.config);

        let listener = tokio::net::TcpListener::bind(self.config.listen_address())
            .await
            .map_err(|e| TranslationError::ConfigError(format!("无法绑定地址: {}", e)))?;

        info!("Web server starting at http://{}", self.config.listen_address());

        axum::serve(listener, app)
            .await
            .map_err(|e| TranslationError::InternalError(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// 创建路由器
pub fn create_router(app_state: Arc<AppState>, config: &WebConfig) -> Router {
    let mut app = create_routes()
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    if let Some(static_dir) = &config.static_dir {
        app = app.nest_service("/static", ServeDir::new(static_dir));
    }

    app
}
