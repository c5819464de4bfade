//! 计量单位

use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unit {
    pub id: i64,
    pub name: String,
}

/// 换算系数：`from` 单位的数量乘以 `factor` 得到 `to` 单位的数量
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitConversion {
    pub from_unit_id: i64,
    pub to_unit_id: i64,
    pub factor: Decimal,
}
