//! 错误响应

use std::any::Any;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stockpile_errors::{AppError, ErrorBody};
use tracing::error;

use crate::error::BatchError;

impl IntoResponse for BatchError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Store(_) | Self::Internal(_)) {
            error!(error = %self, "Request failed with internal error");
        }
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_error_body())).into_response()
    }
}

/// handler 内 panic 时返回 `INTERNAL_ERROR`
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    error!(panic = %detail, "Handler panicked");

    let body: ErrorBody = AppError::internal(detail).to_error_body();
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
