//! 列表查询参数

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chrono::NaiveDate;
use serde::Deserialize;
use stockpile_common::{Cursor, PageDirection, PageRequest};
use stockpile_config::PaginationConfig;

use crate::domain::{BatchFilter, BatchPageQuery};
use crate::error::{BatchError, BatchResult};

/// `?pageSize=&cursor=&direction=&sku=&expiresBefore=&includeEmpty=`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page_size: Option<u32>,
    pub cursor: Option<String>,
    pub direction: Option<PageDirection>,
    pub sku: Option<String>,
    pub expires_before: Option<NaiveDate>,
    pub include_empty: Option<bool>,
}

impl ListQuery {
    /// 解析游标并截断页大小
    pub fn into_page_query(
        self,
        pagination: &PaginationConfig,
        locale: Option<String>,
    ) -> BatchResult<BatchPageQuery> {
        let page_size = pagination.clamp(self.page_size);
        let direction = self.direction.unwrap_or_default();

        let page = match self.cursor.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let cursor = Cursor::decode(raw)
                    .map_err(|e| BatchError::invalid(format!("Invalid cursor: {}", e)))?;
                PageRequest::after(page_size, cursor).with_direction(direction)
            }
            _ => PageRequest::first(page_size).with_direction(direction),
        };

        let filter = BatchFilter {
            sku: self.sku.filter(|s| !s.trim().is_empty()),
            expires_before: self.expires_before,
            include_empty: self.include_empty.unwrap_or(false),
            locale,
        };

        BatchPageQuery::new(filter, page)
            .map_err(|e| BatchError::invalid(format!("Invalid cursor: {}", e)))
    }
}

impl<S> FromRequestParts<S> for ListQuery
where
    S: Send + Sync,
{
    type Rejection = BatchError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<ListQuery>::from_request_parts(parts, state)
            .await
            .map(|Query(query)| query)
            .map_err(|rejection| BatchError::invalid(rejection.body_text()))
    }
}
