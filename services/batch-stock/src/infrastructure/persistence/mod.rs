//! PostgreSQL 持久化

mod batch_query_repository;
mod recipe_repository;
mod stock_transaction;
mod unit_repository;

pub use batch_query_repository::PostgresBatchQueryRepository;
pub use recipe_repository::PostgresRecipeRepository;
pub use stock_transaction::{PostgresStockTransaction, PostgresStockTransactionFactory};
pub use unit_repository::PostgresUnitRepository;
