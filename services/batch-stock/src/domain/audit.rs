//! 库存流水

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use stockpile_common::UserId;

/// 库存变化方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDirection {
    Inbound,
    Outbound,
}

impl StockDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "IN",
            Self::Outbound => "OUT",
        }
    }
}

/// 流水记录，插入后不再修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditCommand {
    /// 新建批次时为空
    pub batch_id: Option<i64>,
    pub sku: String,
    pub unit_id: i64,
    /// 标准单位下的数量，总为正
    pub quantity: Decimal,
    pub direction: StockDirection,
    pub reason: String,
    pub comment: Option<String>,
    pub cost: Decimal,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
}

impl AuditCommand {
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            StockDirection::Inbound => self.quantity,
            StockDirection::Outbound => -self.quantity,
        }
    }
}
