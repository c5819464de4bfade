//! 通用类型定义

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// 用户 ID（审计记录中的操作人）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[display("{_0}")]
pub struct UserId(pub i64);

impl UserId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}
