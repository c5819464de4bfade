//! 批次库存错误
//!
//! 每个变体对应一个稳定的对外错误码和 HTTP 状态码

use rust_decimal::Decimal;
use stockpile_errors::{AppError, ErrorBody, FieldError, codes};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("{message}")]
    InvalidInput {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("No conversion from unit {from} to unit {to}")]
    UnitConversionMissing { from: i64, to: i64 },

    #[error("Batch {id} not found")]
    BatchNotFound { id: i64 },

    #[error("Insufficient quantity in batch {id}: available {available}, requested {requested}")]
    InsufficientQuantity {
        id: i64,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient ingredient {sku}: available {available}, required {required}")]
    InsufficientIngredient {
        sku: String,
        available: Decimal,
        required: Decimal,
    },

    #[error("Lock {name} is unavailable")]
    LockUnavailable { name: String },

    #[error("Batches {ids:?} disappeared before update")]
    BatchMissing { ids: Vec<i64> },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type BatchResult<T> = Result<T, BatchError>;

impl BatchError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn invalid_fields(errors: Vec<FieldError>) -> Self {
        Self::InvalidInput {
            message: "Invalid input".to_string(),
            errors,
        }
    }

    /// 数量或金额超出 Decimal 可表示范围
    pub fn out_of_range(what: &str) -> Self {
        Self::invalid(format!("{} is out of range", what))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => codes::INVALID_INPUT,
            Self::UnitConversionMissing { .. } => "UNIT_CONVERSION_MISSING",
            Self::BatchNotFound { .. } => "BATCH_NOT_FOUND",
            Self::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            Self::InsufficientIngredient { .. } => "INSUFFICIENT_INGREDIENT",
            Self::LockUnavailable { .. } => "LOCK_UNAVAILABLE",
            Self::BatchMissing { .. } => "BATCH_MISSING",
            Self::NotFound(_) => codes::NOT_FOUND,
            Self::Unauthorized(_) => codes::UNAUTHORIZED,
            Self::Forbidden(_) => codes::FORBIDDEN,
            Self::Duplicate(_) => codes::BAD_REQUEST,
            Self::Store(_) | Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput { .. } | Self::Duplicate(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::BatchNotFound { .. } | Self::NotFound(_) => 404,
            Self::InsufficientQuantity { .. }
            | Self::InsufficientIngredient { .. }
            | Self::BatchMissing { .. } => 409,
            Self::UnitConversionMissing { .. } => 422,
            Self::Store(_) | Self::Internal(_) => 500,
            Self::LockUnavailable { .. } => 503,
        }
    }

    /// 调用方可以直接重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable { .. })
    }

    /// 对外错误体，存储层与内部错误不暴露细节
    pub fn to_error_body(&self) -> ErrorBody {
        let message = match self {
            Self::Store(_) | Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody::new(message, self.status_code(), self.code());
        match self {
            Self::InvalidInput { errors, .. } => body.with_errors(errors.clone()),
            _ => body,
        }
    }
}

impl From<AppError> for BatchError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::invalid(msg),
            AppError::Unauthorized(msg) => Self::Unauthorized(msg),
            AppError::Forbidden(msg) => Self::Forbidden(msg),
            AppError::Conflict(msg) => Self::Duplicate(msg),
            AppError::Internal(msg) => Self::Internal(msg),
            AppError::Database(msg)
            | AppError::ExternalService(msg)
            | AppError::ResourceExhausted(msg) => Self::Store(msg),
        }
    }
}

impl From<BatchError> for AppError {
    fn from(error: BatchError) -> Self {
        match error {
            BatchError::NotFound(msg) => AppError::NotFound(msg),
            BatchError::BatchNotFound { .. } => AppError::NotFound(error.to_string()),
            BatchError::InvalidInput { message, .. } => AppError::Validation(message),
            BatchError::Unauthorized(msg) => AppError::Unauthorized(msg),
            BatchError::Forbidden(msg) => AppError::Forbidden(msg),
            BatchError::Duplicate(msg) => AppError::Conflict(msg),
            BatchError::Store(msg) => AppError::Database(msg),
            BatchError::LockUnavailable { .. } => AppError::ResourceExhausted(error.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}
