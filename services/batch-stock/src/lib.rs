//! batch-stock - 批次库存变更引擎
//!
//! 原子地增减仓库或零售商批次，可选按配方扣减原料，并写入库存流水。

pub mod api;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{BatchError, BatchResult};
