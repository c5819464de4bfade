//! 应用层

pub mod executor;
pub mod lock_manager;
pub mod planner;
pub mod unit_converter;
pub mod validation;

pub use executor::*;
pub use lock_manager::*;
pub use planner::*;
pub use unit_converter::*;
pub use validation::*;
