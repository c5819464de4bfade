//! HTTP 接口
//!
//! 仓库批次以 `X-Warehouse-Id` 头确定范围，零售商批次以路径中的零售商 ID 确定范围

mod error;
mod extract;
mod handlers;
mod query;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::application::BatchStockService;

pub use error::panic_response;
pub use extract::{Actor, ApiJson, Locale, WarehouseScope};
pub use query::ListQuery;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BatchStockService>,
}

impl AppState {
    pub fn new(service: Arc<BatchStockService>) -> Self {
        Self { service }
    }
}

/// 批次库存路由
pub fn router(state: AppState) -> Router {
    let warehouse = Router::new()
        .route("/warehouse/batches", get(handlers::warehouse_list))
        .route("/warehouse/batches/search", get(handlers::warehouse_search))
        .route("/warehouse/batches/increment", post(handlers::warehouse_increment))
        .route("/warehouse/batches/decrement", post(handlers::warehouse_decrement))
        .route(
            "/warehouse/batches/increment-with-recipe",
            post(handlers::warehouse_increment_with_recipe),
        )
        .route("/warehouse/batches/{id}", get(handlers::warehouse_get));

    let retailer = Router::new()
        .route("/retailers/{retailer_id}/batches", get(handlers::retailer_list))
        .route(
            "/retailers/{retailer_id}/batches/search",
            get(handlers::retailer_search),
        )
        .route(
            "/retailers/{retailer_id}/batches/increment",
            post(handlers::retailer_increment),
        )
        .route(
            "/retailers/{retailer_id}/batches/decrement",
            post(handlers::retailer_decrement),
        )
        .route(
            "/retailers/{retailer_id}/batches/increment-with-recipe",
            post(handlers::retailer_increment_with_recipe),
        )
        .route("/retailers/{retailer_id}/batches/{id}", get(handlers::retailer_get));

    warehouse
        .merge(retailer)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}
