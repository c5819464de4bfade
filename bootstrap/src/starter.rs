//! 服务启动器
//!
//! 提供统一的 HTTP 服务启动模式

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use stockpile_config::AppConfig;
use stockpile_errors::AppResult;
use stockpile_telemetry::init_metrics;
use tracing::info;

use crate::health::{HealthChecker, health_routes};
use crate::infrastructure::Infrastructure;
use crate::runtime::{init_runtime, shutdown_signal};

/// 运行 HTTP 服务
///
/// 1. 加载配置
/// 2. 初始化日志与 Prometheus recorder
/// 3. 创建基础设施资源（带重试）
/// 4. 调用闭包构建业务路由，并合并健康检查路由
/// 5. 启动服务器，收到信号后 graceful shutdown
///
/// ```ignore
/// stockpile_bootstrap::run_http("config", |infra| async move {
///     Ok(build_router(infra))
/// })
/// .await
/// ```
pub async fn run_http<F, Fut>(
    config_dir: &str,
    router_builder: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(Infrastructure) -> Fut,
    Fut: Future<Output = AppResult<Router>>,
{
    let config = AppConfig::load(config_dir)?;
    init_runtime(&config);

    info!("Starting {} service", config.app_name);

    let metrics = init_metrics()?;
    let infra = Infrastructure::from_config(config.clone()).await?;
    let checker = Arc::new(HealthChecker::new(infra.clone()));

    let app = router_builder(infra)
        .await?
        .merge(health_routes(checker, metrics));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
