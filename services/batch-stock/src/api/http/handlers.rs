//! 请求处理

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use stockpile_common::Page;

use super::extract::{Actor, ApiJson, Locale, WarehouseScope};
use super::query::ListQuery;
use super::AppState;
use crate::domain::{BatchMutation, BatchView, Scope};
use crate::error::{BatchError, BatchResult};

fn retailer_scope(retailer_id: i64) -> BatchResult<Scope> {
    if retailer_id <= 0 {
        return Err(BatchError::invalid("retailer id must be positive"));
    }
    Ok(Scope::Retailer(retailer_id))
}

async fn list(
    state: &AppState,
    scope: Scope,
    query: ListQuery,
    locale: Locale,
) -> BatchResult<Json<Page<BatchView>>> {
    let page_query = query.into_page_query(state.service.pagination(), locale.0)?;
    Ok(Json(state.service.list(scope, page_query).await?))
}

async fn search(
    state: &AppState,
    scope: Scope,
    mut query: ListQuery,
    locale: Locale,
) -> BatchResult<Json<Page<BatchView>>> {
    let sku = query
        .sku
        .take()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| BatchError::invalid("sku query parameter is required"))?;
    let page_query = query.into_page_query(state.service.pagination(), locale.0)?;
    Ok(Json(state.service.search(scope, sku, page_query).await?))
}

// ---------------------------------------------------------------------------
// 仓库批次
// ---------------------------------------------------------------------------

pub async fn warehouse_increment(
    State(state): State<AppState>,
    WarehouseScope(scope): WarehouseScope,
    Actor(actor): Actor,
    ApiJson(requests): ApiJson<Vec<BatchMutation>>,
) -> BatchResult<StatusCode> {
    state.service.increment(scope, actor, requests).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn warehouse_decrement(
    State(state): State<AppState>,
    WarehouseScope(scope): WarehouseScope,
    Actor(actor): Actor,
    ApiJson(requests): ApiJson<Vec<BatchMutation>>,
) -> BatchResult<StatusCode> {
    state.service.decrement(scope, actor, requests).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn warehouse_increment_with_recipe(
    State(state): State<AppState>,
    WarehouseScope(scope): WarehouseScope,
    Actor(actor): Actor,
    ApiJson(requests): ApiJson<Vec<BatchMutation>>,
) -> BatchResult<StatusCode> {
    state
        .service
        .increment_with_recipe(scope, actor, requests)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn warehouse_list(
    State(state): State<AppState>,
    WarehouseScope(scope): WarehouseScope,
    locale: Locale,
    query: ListQuery,
) -> BatchResult<Json<Page<BatchView>>> {
    list(&state, scope, query, locale).await
}

pub async fn warehouse_search(
    State(state): State<AppState>,
    WarehouseScope(scope): WarehouseScope,
    locale: Locale,
    query: ListQuery,
) -> BatchResult<Json<Page<BatchView>>> {
    search(&state, scope, query, locale).await
}

pub async fn warehouse_get(
    State(state): State<AppState>,
    WarehouseScope(scope): WarehouseScope,
    Locale(locale): Locale,
    Path(id): Path<i64>,
) -> BatchResult<Json<BatchView>> {
    Ok(Json(state.service.get_by_id(scope, id, locale).await?))
}

// ---------------------------------------------------------------------------
// 零售商批次
// ---------------------------------------------------------------------------

pub async fn retailer_increment(
    State(state): State<AppState>,
    Path(retailer_id): Path<i64>,
    Actor(actor): Actor,
    ApiJson(requests): ApiJson<Vec<BatchMutation>>,
) -> BatchResult<StatusCode> {
    state
        .service
        .increment(retailer_scope(retailer_id)?, actor, requests)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retailer_decrement(
    State(state): State<AppState>,
    Path(retailer_id): Path<i64>,
    Actor(actor): Actor,
    ApiJson(requests): ApiJson<Vec<BatchMutation>>,
) -> BatchResult<StatusCode> {
    state
        .service
        .decrement(retailer_scope(retailer_id)?, actor, requests)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retailer_increment_with_recipe(
    State(state): State<AppState>,
    Path(retailer_id): Path<i64>,
    Actor(actor): Actor,
    ApiJson(requests): ApiJson<Vec<BatchMutation>>,
) -> BatchResult<StatusCode> {
    state
        .service
        .increment_with_recipe(retailer_scope(retailer_id)?, actor, requests)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retailer_list(
    State(state): State<AppState>,
    Path(retailer_id): Path<i64>,
    locale: Locale,
    query: ListQuery,
) -> BatchResult<Json<Page<BatchView>>> {
    list(&state, retailer_scope(retailer_id)?, query, locale).await
}

pub async fn retailer_search(
    State(state): State<AppState>,
    Path(retailer_id): Path<i64>,
    locale: Locale,
    query: ListQuery,
) -> BatchResult<Json<Page<BatchView>>> {
    search(&state, retailer_scope(retailer_id)?, query, locale).await
}

pub async fn retailer_get(
    State(state): State<AppState>,
    Path((retailer_id, id)): Path<(i64, i64)>,
    Locale(locale): Locale,
) -> BatchResult<Json<BatchView>> {
    Ok(Json(
        state
            .service
            .get_by_id(retailer_scope(retailer_id)?, id, locale)
            .await?,
    ))
}
