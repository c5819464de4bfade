//! 请求校验

use rust_decimal::Decimal;
use stockpile_errors::FieldError;

use crate::domain::{BatchMutation, MutationKind, Scope};
use crate::error::{BatchError, BatchResult};

const WAREHOUSE_SKU_LEN: (usize, usize) = (1, 255);
const RETAILER_SKU_LEN: (usize, usize) = (10, 36);

/// 校验一批变更请求，收集全部字段错误后一次返回
pub fn validate_mutations(
    scope: &Scope,
    kind: MutationKind,
    requests: &[BatchMutation],
) -> BatchResult<()> {
    if requests.is_empty() {
        return Err(BatchError::invalid("At least one batch mutation is required"));
    }

    let mut errors = Vec::new();
    for (index, request) in requests.iter().enumerate() {
        validate_one(scope, kind, index, request, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(BatchError::invalid_fields(errors))
    }
}

fn validate_one(
    scope: &Scope,
    kind: MutationKind,
    index: usize,
    request: &BatchMutation,
    errors: &mut Vec<FieldError>,
) {
    let field = |name: &str| format!("requests[{}].{}", index, name);

    if request.quantity <= Decimal::ZERO {
        errors.push(FieldError::new(field("quantity"), "must be positive"));
    }

    let (min, max) = if scope.is_retailer() {
        RETAILER_SKU_LEN
    } else {
        WAREHOUSE_SKU_LEN
    };
    let sku_len = request.sku.chars().count();
    if sku_len < min || sku_len > max {
        errors.push(FieldError::new(
            field("sku"),
            format!("length must be between {} and {}", min, max),
        ));
    }

    if request.unit_id <= 0 {
        errors.push(FieldError::new(field("unitId"), "must be positive"));
    }

    match request.id {
        Some(id) if id <= 0 => errors.push(FieldError::new(field("id"), "must be positive")),
        None if kind == MutationKind::Decrement => {
            errors.push(FieldError::new(field("id"), "is required for decrement"))
        }
        _ => {}
    }

    if let Scope::Retailer(retailer_id) = scope {
        match request.reason.as_deref() {
            None => errors.push(FieldError::new(field("reason"), "is required")),
            Some(reason) if !is_reason_name(reason) => errors.push(FieldError::new(
                field("reason"),
                "must contain only letters, digits and underscores",
            )),
            Some(_) => {}
        }
        if request.retailer_id.is_some_and(|id| id != *retailer_id) {
            errors.push(FieldError::new(
                field("retailerId"),
                "does not match the retailer in the path",
            ));
        }
    }
}

fn is_reason_name(reason: &str) -> bool {
    !reason.is_empty() && reason.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
