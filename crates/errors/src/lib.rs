//! stockpile-errors - 统一错误处理
//!
//! 对外错误体为 `{message, status, code, errors?}`

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// 转换为 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            // 唯一键冲突等存储层冲突按请求错误对外暴露
            Self::Conflict(_) => 400,
            Self::Internal(_) => 500,
            Self::Database(_) => 500,
            Self::ExternalService(_) => 502,
            Self::ResourceExhausted(_) => 429,
        }
    }

    /// 对外错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => codes::NOT_FOUND,
            Self::Validation(_) => codes::INVALID_INPUT,
            Self::Unauthorized(_) => codes::UNAUTHORIZED,
            Self::Forbidden(_) => codes::FORBIDDEN,
            Self::Conflict(_) => codes::BAD_REQUEST,
            Self::ResourceExhausted(_) => codes::BAD_REQUEST,
            Self::Internal(_) | Self::Database(_) | Self::ExternalService(_) => {
                codes::INTERNAL_ERROR
            }
        }
    }

    /// 转换为对外错误体。内部错误不暴露细节。
    pub fn to_error_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal(_) | Self::Database(_) | Self::ExternalService(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        ErrorBody::new(message, self.status_code(), self.code())
    }
}

/// 错误码常量
pub mod codes {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const INVALID_INPUT: &str = "INVALID_INPUT";
}

/// 字段级校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 对外错误体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub status: u16,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, status: u16, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            code: code.into(),
            errors: None,
        }
    }

    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        if !errors.is_empty() {
            self.errors = Some(errors);
        }
        self
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
