//! Web 路由处理器

pub mod assets;
pub mod lookup;
pub mod render;

pub use assets::{health, reconcile_script};
pub use lookup::lookup_translations;
pub use render::render_page;

use axum::{http::StatusCode, response::Json};

use crate::translation::error::ErrorCategory;
use crate::translation::TranslationError;
use crate::web::types::ErrorResponse;

/// 处理器统一的错误响应
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// 把翻译错误映射为状态码和 `{error}` 响应体
pub fn error_response(err: TranslationError) -> ApiError {
    let status = match err.category() {
        ErrorCategory::Input => StatusCode::BAD_REQUEST,
        ErrorCategory::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::Service | ErrorCategory::Network => StatusCode::BAD_GATEWAY,
        ErrorCategory::Cache => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    err.log("请求处理失败");
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            retryable: err.is_retryable(),
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            retryable: false,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_status_and_retry_hint() {
        let (status, Json(body)) = error_response(TranslationError::TimeoutError("lookup".to_string()));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body.retryable);

        let (status, Json(body)) = error_response(TranslationError::InvalidInput("lang".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.retryable);

        let (status, Json(body)) = error_response(TranslationError::CacheWriteError("down".to_string()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.retryable);
        assert!(body.error.contains("down"));
    }
}
