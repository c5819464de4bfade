//! 单位换算缓存
//!
//! 启动时加载全部单位与换算系数；未命中时回源并回填。
//! 缓存为进程内缓存，换算表只追加，允许短暂过期。

use std::sync::Arc;

use metrics::counter;
use moka::future::Cache as MokaCache;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::{Unit, UnitRepository};
use crate::error::{BatchError, BatchResult};

const MAX_UNITS: u64 = 10_000;
const MAX_FACTORS: u64 = 100_000;

/// 单位换算器
#[derive(Clone)]
pub struct UnitConverter {
    repository: Arc<dyn UnitRepository>,
    units: MokaCache<i64, Unit>,
    /// 键为有序对 `(to, from)`
    factors: MokaCache<(i64, i64), Decimal>,
}

impl UnitConverter {
    pub fn new(repository: Arc<dyn UnitRepository>) -> Self {
        Self {
            repository,
            units: MokaCache::builder().max_capacity(MAX_UNITS).build(),
            factors: MokaCache::builder().max_capacity(MAX_FACTORS).build(),
        }
    }

    /// 预热：加载全部单位和换算系数，返回加载的系数数量
    pub async fn warm_up(&self) -> BatchResult<usize> {
        let units = self.repository.list_units().await?;
        let unit_count = units.len();
        for unit in units {
            self.units.insert(unit.id, unit).await;
        }

        let conversions = self.repository.list_conversions().await?;
        let factor_count = conversions.len();
        for conversion in conversions {
            self.factors
                .insert(
                    (conversion.to_unit_id, conversion.from_unit_id),
                    conversion.factor,
                )
                .await;
        }

        info!(units = unit_count, factors = factor_count, "Unit cache warmed up");
        Ok(factor_count)
    }

    /// 清空后重新加载
    pub async fn refresh(&self) -> BatchResult<usize> {
        self.units.invalidate_all();
        self.factors.invalidate_all();
        self.warm_up().await
    }

    pub async fn unit_by_id(&self, id: i64) -> BatchResult<Unit> {
        if let Some(unit) = self.units.get(&id).await {
            return Ok(unit);
        }

        counter!("batch_stock_unit_cache_misses_total", "kind" => "unit").increment(1);
        let unit = self
            .repository
            .find_unit(id)
            .await?
            .ok_or_else(|| BatchError::NotFound(format!("Unit {}", id)))?;
        self.units.insert(id, unit.clone()).await;
        Ok(unit)
    }

    /// 把 `quantity` 从 `from` 单位换算到 `to` 单位，返回 `(to, 换算后数量)`
    ///
    /// 只做单步换算，不做链式推导
    pub async fn convert(&self, from: i64, to: i64, quantity: Decimal) -> BatchResult<(i64, Decimal)> {
        if from == to {
            return Ok((to, quantity));
        }

        self.unit_by_id(from).await?;
        self.unit_by_id(to).await?;

        let factor = match self.factors.get(&(to, from)).await {
            Some(factor) => factor,
            None => {
                counter!("batch_stock_unit_cache_misses_total", "kind" => "factor").increment(1);
                debug!(from, to, "Conversion factor cache miss");
                let factor = self
                    .repository
                    .find_factor(from, to)
                    .await?
                    .ok_or(BatchError::UnitConversionMissing { from, to })?;
                self.factors.insert((to, from), factor).await;
                factor
            }
        };

        let converted = quantity
            .checked_mul(factor)
            .ok_or_else(|| BatchError::out_of_range("Converted quantity"))?;
        Ok((to, converted))
    }
}
