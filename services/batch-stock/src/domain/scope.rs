//! 批次归属范围
//!
//! 仓库批次与零售商批次结构相同，分表存储

use std::fmt;

/// 批次归属：仓库或零售商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Warehouse(i64),
    Retailer(i64),
}

impl Scope {
    pub fn owner_id(&self) -> i64 {
        match self {
            Self::Warehouse(id) | Self::Retailer(id) => *id,
        }
    }

    pub fn is_retailer(&self) -> bool {
        matches!(self, Self::Retailer(_))
    }

    /// 批次表
    pub fn batch_table(&self) -> &'static str {
        match self {
            Self::Warehouse(_) => "batches",
            Self::Retailer(_) => "retailer_batches",
        }
    }

    /// 库存流水表
    pub fn audit_table(&self) -> &'static str {
        match self {
            Self::Warehouse(_) => "batch_transactions",
            Self::Retailer(_) => "retailer_batch_transactions",
        }
    }

    /// 归属列
    pub fn owner_column(&self) -> &'static str {
        match self {
            Self::Warehouse(_) => "warehouse_id",
            Self::Retailer(_) => "retailer_id",
        }
    }

    /// 列表自然排序：仓库按最早过期在前，零售商相反
    pub fn lists_ascending(&self) -> bool {
        matches!(self, Self::Warehouse(_))
    }

    pub fn batch_lock_name(&self, batch_id: i64) -> String {
        format!("batch:{}:{}", self, batch_id)
    }

    pub fn sku_lock_name(&self, sku: &str) -> String {
        format!("batch:{}:{}", self, sku)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warehouse(id) => write!(f, "warehouse={}", id),
            Self::Retailer(id) => write!(f, "retailer={}", id),
        }
    }
}
