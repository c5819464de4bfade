//! 批次实体与请求

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockpile_common::{Cursor, CursorError, PageRequest};

/// 变体元信息（事务内只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantMeta {
    pub sku: String,
    /// 标准单位，批次数量均以此单位存储
    pub standard_unit_id: i64,
    /// 每标准单位成本
    pub cost: Decimal,
    pub shelf_life_days: i32,
}

/// 已持久化的批次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchBase {
    pub id: i64,
    pub sku: String,
    pub quantity: Decimal,
    pub unit_id: i64,
    pub expires_at: NaiveDate,
}

/// 批次变更请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMutation {
    pub sku: String,
    #[serde(default)]
    pub id: Option<i64>,
    pub quantity: Decimal,
    pub unit_id: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub retailer_id: Option<i64>,
}

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Increment,
    Decrement,
    IncrementWithRecipe,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::IncrementWithRecipe => "increment_with_recipe",
        }
    }

    pub fn is_increment(&self) -> bool {
        !matches!(self, Self::Decrement)
    }

    pub fn includes_recipes(&self) -> bool {
        matches!(self, Self::IncrementWithRecipe)
    }

    /// 请求未给出原因时的默认原因
    pub fn default_reason(&self) -> &'static str {
        match self {
            Self::Increment | Self::IncrementWithRecipe => reasons::RESTOCK,
            Self::Decrement => reasons::DEPLETION,
        }
    }
}

pub mod reasons {
    pub const RESTOCK: &str = "RESTOCK";
    pub const DEPLETION: &str = "DEPLETION";
    pub const RECIPE_USE: &str = "RECIPE_USE";
}

/// 批次数量更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchUpdate {
    pub batch_id: i64,
    pub sku: String,
    pub new_quantity: Decimal,
    /// 有符号变化量，同一批次多次变更时累加
    pub modified_by: Decimal,
    pub reason: String,
}

/// 新建批次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchCreate {
    pub sku: String,
    pub quantity: Decimal,
    pub unit_id: i64,
    pub expires_at: NaiveDate,
}

/// 批次视图（含本地化名称）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub id: i64,
    pub sku: String,
    pub product_name: Option<String>,
    pub quantity: Decimal,
    pub unit_id: i64,
    pub unit_name: Option<String>,
    pub expires_at: NaiveDate,
}

impl BatchView {
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            expires_at: self.expires_at,
            id: self.id,
        }
    }
}

/// 列表排序键 `(expires_at, id)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    pub expires_at: NaiveDate,
    pub id: i64,
}

impl OrderKey {
    pub fn to_cursor(&self) -> Cursor {
        Cursor::new([self.expires_at.format("%Y-%m-%d").to_string(), self.id.to_string()])
    }

    pub fn from_cursor(cursor: &Cursor) -> Result<Self, CursorError> {
        let values = cursor.expect_arity(2)?;
        let expires_at = NaiveDate::parse_from_str(&values[0], "%Y-%m-%d")
            .map_err(|_| CursorError::Malformed(values[0].clone()))?;
        let id = values[1]
            .parse::<i64>()
            .map_err(|_| CursorError::Malformed(values[1].clone()))?;
        Ok(Self { expires_at, id })
    }
}

/// 列表过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFilter {
    pub sku: Option<String>,
    pub expires_before: Option<NaiveDate>,
    /// 默认隐藏数量为零的批次
    pub include_empty: bool,
    pub locale: Option<String>,
}

impl BatchFilter {
    pub fn matches(&self, view: &BatchView) -> bool {
        if self.sku.as_ref().is_some_and(|sku| &view.sku != sku) {
            return false;
        }
        if self
            .expires_before
            .is_some_and(|before| view.expires_at >= before)
        {
            return false;
        }
        self.include_empty || view.quantity > Decimal::ZERO
    }
}

/// 分页查询，游标已解析为排序键
#[derive(Debug, Clone)]
pub struct BatchPageQuery {
    pub filter: BatchFilter,
    pub page: PageRequest,
    pub after: Option<OrderKey>,
}

impl BatchPageQuery {
    pub fn new(filter: BatchFilter, page: PageRequest) -> Result<Self, CursorError> {
        let after = page.cursor.as_ref().map(OrderKey::from_cursor).transpose()?;
        Ok(Self {
            filter,
            page,
            after,
        })
    }
}
