//! 健康检查模块
//!
//! 提供 /health、/ready 和 /metrics 端点

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use stockpile_adapter_postgres::check_connection as check_postgres;
use stockpile_adapter_redis::check_connection as check_redis;

use crate::Infrastructure;

/// 健康检查状态
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: Vec<ComponentHealth>,
}

/// 组件健康状态
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            checks: vec![],
        }
    }

    pub fn add_check(&mut self, check: ComponentHealth) {
        if check.status != "healthy" {
            self.status = "unhealthy".to_string();
        }
        self.checks.push(check);
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "healthy".to_string(),
            message: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 健康检查器
pub struct HealthChecker {
    infra: Infrastructure,
}

impl HealthChecker {
    pub fn new(infra: Infrastructure) -> Self {
        Self { infra }
    }

    /// 存活检查，不检查依赖
    pub async fn liveness(&self) -> HealthStatus {
        HealthStatus::healthy()
    }

    /// 就绪检查：数据库与锁存储均可用
    pub async fn readiness(&self) -> HealthStatus {
        let mut status = HealthStatus::healthy();

        let pool = self.infra.postgres_pool();
        status.add_check(match check_postgres(&pool).await {
            Ok(()) => ComponentHealth::healthy("postgres"),
            Err(e) => ComponentHealth::unhealthy("postgres", e.to_string()),
        });

        let mut conn = self.infra.redis_connection_manager();
        status.add_check(match check_redis(&mut conn).await {
            Ok(()) => ComponentHealth::healthy("redis"),
            Err(e) => ComponentHealth::unhealthy("redis", e.to_string()),
        });

        status
    }
}

#[derive(Clone)]
struct HealthState {
    checker: Arc<HealthChecker>,
    metrics: PrometheusHandle,
}

/// 健康检查与指标路由，合并进业务路由
pub fn health_routes(checker: Arc<HealthChecker>, metrics: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(HealthState { checker, metrics })
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.checker.liveness().await))
}

async fn ready_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let status = state.checker.readiness().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        state.metrics.render(),
    )
}
