//! 游标分页
//!
//! 游标是排序键各列值以逗号拼接后的 base64 编码，对客户端不透明，
//! 但跨进程重启保持稳定。

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 游标解析错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("cursor is not valid base64")]
    InvalidEncoding,
    #[error("cursor is not valid utf-8")]
    InvalidUtf8,
    #[error("cursor is empty")]
    Empty,
    #[error("cursor has {actual} values, expected {expected}")]
    Arity { expected: usize, actual: usize },
    #[error("cursor value `{0}` is malformed")]
    Malformed(String),
}

/// 分页游标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    values: Vec<String>,
}

impl Cursor {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// 校验列数并返回各列值
    pub fn expect_arity(&self, expected: usize) -> Result<&[String], CursorError> {
        if self.values.len() != expected {
            return Err(CursorError::Arity {
                expected,
                actual: self.values.len(),
            });
        }
        Ok(&self.values)
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(self.values.join(","))
    }

    pub fn decode(raw: &str) -> Result<Self, CursorError> {
        let bytes = STANDARD
            .decode(raw.trim())
            .map_err(|_| CursorError::InvalidEncoding)?;
        let text = String::from_utf8(bytes).map_err(|_| CursorError::InvalidUtf8)?;
        if text.is_empty() {
            return Err(CursorError::Empty);
        }
        Ok(Self::new(text.split(',')))
    }
}

/// 翻页方向：1 向后翻页，0 刷新（包含游标行），-1 向前翻页
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum PageDirection {
    #[default]
    Forward,
    Refresh,
    Backward,
}

impl PageDirection {
    /// 给定列表的自然排序方向，返回游标比较符
    pub fn comparison(self, ascending: bool) -> &'static str {
        match (self, ascending) {
            (Self::Forward, true) => ">",
            (Self::Refresh, true) => ">=",
            (Self::Backward, true) => "<",
            (Self::Forward, false) => "<",
            (Self::Refresh, false) => "<=",
            (Self::Backward, false) => ">",
        }
    }

    /// 查询时实际的扫描方向。向前翻页时反向扫描，再在内存中翻转。
    pub fn scan_ascending(self, ascending: bool) -> bool {
        match self {
            Self::Backward => !ascending,
            Self::Forward | Self::Refresh => ascending,
        }
    }
}

impl TryFrom<i8> for PageDirection {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Forward),
            0 => Ok(Self::Refresh),
            -1 => Ok(Self::Backward),
            other => Err(format!("invalid page direction {other}, expected -1, 0 or 1")),
        }
    }
}

impl From<PageDirection> for i8 {
    fn from(direction: PageDirection) -> Self {
        match direction {
            PageDirection::Forward => 1,
            PageDirection::Refresh => 0,
            PageDirection::Backward => -1,
        }
    }
}

/// 分页请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: u32,
    pub cursor: Option<Cursor>,
    pub direction: PageDirection,
}

impl PageRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size,
            cursor: None,
            direction: PageDirection::Forward,
        }
    }

    pub fn after(page_size: u32, cursor: Cursor) -> Self {
        Self {
            page_size,
            cursor: Some(cursor),
            direction: PageDirection::Forward,
        }
    }

    pub fn with_direction(mut self, direction: PageDirection) -> Self {
        self.direction = direction;
        self
    }

    /// 查询条数：多取一行用于判断是否还有下一页
    pub fn fetch_limit(&self) -> i64 {
        i64::from(self.page_size) + 1
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_cursor: Option<String>,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// 由按扫描方向取回的行（最多 `page_size + 1` 行）组装分页结果
    pub fn assemble<F>(mut rows: Vec<T>, request: &PageRequest, cursor_of: F) -> Self
    where
        F: Fn(&T) -> Cursor,
    {
        let page_size = request.page_size as usize;
        let overflow = rows.len() > page_size;
        rows.truncate(page_size);

        let has_cursor = request.cursor.is_some();
        let (has_next, has_prev) = match request.direction {
            PageDirection::Backward => {
                rows.reverse();
                (has_cursor, overflow)
            }
            PageDirection::Forward | PageDirection::Refresh => (overflow, has_cursor),
        };

        let next_cursor = if has_next {
            rows.last().map(|row| cursor_of(row).encode())
        } else {
            None
        };
        let prev_cursor = if has_prev {
            rows.first().map(|row| cursor_of(row).encode())
        } else {
            None
        };

        Self {
            items: rows,
            page_size: request.page_size,
            next_cursor,
            prev_cursor,
            has_next,
            has_prev,
        }
    }

    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page_size: self.page_size,
            next_cursor: self.next_cursor,
            prev_cursor: self.prev_cursor,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}
