//! 请求提取器，拒绝时返回统一错误体

use axum::extract::{FromRequest, FromRequestParts, Json, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use stockpile_common::UserId;

use crate::domain::Scope;
use crate::error::BatchError;

pub const WAREHOUSE_ID_HEADER: &str = "x-warehouse-id";
pub const USER_ID_HEADER: &str = "x-user-id";

fn header_id(headers: &HeaderMap, name: &str) -> Result<Option<i64>, ()> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(Some)
            .ok_or(()),
    }
}

/// 操作人，来自 `X-User-Id`
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub UserId);

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = BatchError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header_id(&parts.headers, USER_ID_HEADER) {
            Ok(Some(id)) => Ok(Self(UserId::new(id))),
            Ok(None) => Err(BatchError::Unauthorized("missing X-User-Id header".into())),
            Err(()) => Err(BatchError::Unauthorized("malformed X-User-Id header".into())),
        }
    }
}

/// 仓库范围，来自 `X-Warehouse-Id`
#[derive(Debug, Clone, Copy)]
pub struct WarehouseScope(pub Scope);

impl<S> FromRequestParts<S> for WarehouseScope
where
    S: Send + Sync,
{
    type Rejection = BatchError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match header_id(&parts.headers, WAREHOUSE_ID_HEADER) {
            Ok(Some(id)) => Ok(Self(Scope::Warehouse(id))),
            Ok(None) => Err(BatchError::invalid("X-Warehouse-Id header is required")),
            Err(()) => Err(BatchError::invalid("X-Warehouse-Id must be a positive integer")),
        }
    }
}

/// `Accept-Language` 的首选语言标签
#[derive(Debug, Clone, Default)]
pub struct Locale(pub Option<String>);

impl<S> FromRequestParts<S> for Locale
where
    S: Send + Sync,
{
    type Rejection = BatchError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let locale = parts
            .headers
            .get(axum::http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok())
            .and_then(preferred_language);
        Ok(Self(locale))
    }
}

fn preferred_language(header: &str) -> Option<String> {
    header
        .split(',')
        .map(|part| part.split(';').next().unwrap_or("").trim())
        .find(|tag| !tag.is_empty() && *tag != "*")
        .map(str::to_string)
}

/// JSON 请求体，解析失败返回 `INVALID_INPUT`
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BatchError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Self(value))
            .map_err(|rejection| BatchError::invalid(rejection.body_text()))
    }
}
