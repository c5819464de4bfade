//! 领域层

pub mod audit;
pub mod batch;
pub mod recipe;
pub mod repository;
pub mod scope;
pub mod unit;
pub mod unit_of_work;

pub use audit::*;
pub use batch::*;
pub use recipe::*;
pub use repository::*;
pub use scope::*;
pub use unit::*;
pub use unit_of_work::*;
