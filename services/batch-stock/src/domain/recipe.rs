//! 配方（物料清单）

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;

use super::VariantMeta;

/// 配方边：生产一个单位的结果 SKU 消耗 `quantity` 个 `unit_id` 单位的原料
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeEdge {
    pub result_sku: String,
    pub ingredient_sku: String,
    pub quantity: Decimal,
    pub unit_id: i64,
}

/// 配方展开结果，深度固定为一层
#[derive(Debug, Clone, Default)]
pub struct RecipeBook {
    /// 按结果 SKU 分组，组内按原料 SKU 排序
    pub edges_by_result: BTreeMap<String, Vec<RecipeEdge>>,
    /// 原料自身的变体信息
    pub ingredient_meta: HashMap<String, VariantMeta>,
}

impl RecipeBook {
    pub fn from_edges(edges: Vec<RecipeEdge>, ingredient_meta: HashMap<String, VariantMeta>) -> Self {
        let mut edges_by_result: BTreeMap<String, Vec<RecipeEdge>> = BTreeMap::new();
        for edge in edges {
            edges_by_result
                .entry(edge.result_sku.clone())
                .or_default()
                .push(edge);
        }
        for edges in edges_by_result.values_mut() {
            edges.sort_by(|a, b| a.ingredient_sku.cmp(&b.ingredient_sku));
        }
        Self {
            edges_by_result,
            ingredient_meta,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edges_by_result.is_empty()
    }

    pub fn edges_for(&self, result_sku: &str) -> &[RecipeEdge] {
        self.edges_by_result
            .get(result_sku)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 全部原料 SKU，已排序去重
    pub fn ingredient_skus(&self) -> Vec<String> {
        let mut skus: Vec<String> = self
            .edges_by_result
            .values()
            .flatten()
            .map(|edge| edge.ingredient_sku.clone())
            .collect();
        skus.sort();
        skus.dedup();
        skus
    }

    /// 原料与结果相同的配方边
    pub fn self_referencing(&self) -> Option<&RecipeEdge> {
        self.edges_by_result
            .values()
            .flatten()
            .find(|edge| edge.result_sku == edge.ingredient_sku)
    }
}
