//! stockpile-config - 配置加载库
//!
//! 加载顺序：`default.toml` → `<APP_ENV>.toml` → `APP_` 前缀环境变量（`__` 分隔层级）

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 数据库配置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Redis 配置（分布式锁存储）
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// 分布式锁配置
#[derive(Debug, Clone, Deserialize)]
pub struct LockConfig {
    /// 锁键过期时间
    #[serde(default = "default_lock_ttl_secs")]
    pub ttl_secs: u64,
    /// 获取锁的最长等待时间
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// 锁被占用时的重试间隔
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// 剩余 TTL 低于该值时，提交前续期
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
}

fn default_lock_ttl_secs() -> u64 {
    60
}

fn default_wait_timeout_ms() -> u64 {
    5_000
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_refresh_margin_secs() -> u64 {
    15
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lock_ttl_secs(),
            wait_timeout_ms: default_wait_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            refresh_margin_secs: default_refresh_margin_secs(),
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }
}

/// 列表分页配置
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl PaginationConfig {
    /// 缺省取默认值，超出上限截断，最少为 1
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub locks: LockConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        Ok(Self::figment(config_dir, &env).extract()?)
    }

    fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"))
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}
