//! stockpile-common - 通用类型和工具库

pub mod pagination;
pub mod retry;
pub mod types;

pub use pagination::*;
pub use retry::*;
pub use types::*;
