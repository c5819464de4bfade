//! 数据库错误映射
//!
//! 统一的 SQLx 错误到 AppError 的转换

use stockpile_errors::AppError;

/// 将 SQLx 错误转换为 AppError，按 SQLSTATE 区分请求错误和内部错误
pub fn map_sqlx_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::RowNotFound => AppError::not_found("Record not found"),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => AppError::conflict("Duplicate entry violates unique constraint"),
            Some("23503") => AppError::validation("Foreign key constraint violation"),
            Some("23514") => AppError::validation("Check constraint violation"),
            Some("23502") => AppError::validation("Not null constraint violation"),
            Some("22001") => AppError::validation("String data too long"),
            Some("22P02") => AppError::validation("Invalid input syntax"),
            Some(code) => AppError::database(format!("Database error ({}): {}", code, db_err)),
            None => AppError::database(db_err.to_string()),
        },
        sqlx::Error::PoolTimedOut => AppError::internal("Database connection pool timeout"),
        sqlx::Error::PoolClosed => AppError::internal("Database connection pool is closed"),
        sqlx::Error::Protocol(msg) => AppError::internal(format!("Database protocol error: {}", msg)),
        _ => AppError::database(e.to_string()),
    }
}
