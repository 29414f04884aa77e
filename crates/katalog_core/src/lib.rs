//! Core data-access and transaction logic for the product catalog.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tx;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::category::{Category, CategoryId};
pub use model::product::{Product, ProductId};
pub use model::ValidationError;
pub use repo::category_repo::{CategoryRepository, SqliteCategoryRepository};
pub use repo::product_repo::{ProductRepository, ProductStream, SqliteProductRepository};
pub use repo::query::{
    Direction, ExampleMatcher, FieldPredicate, MatchMode, Order, Page, PageRequest, ProductExample,
    ProductField, Slice, Sort,
};
pub use repo::{RepoError, RepoResult};
pub use service::category_service::{CategoryService, ServiceError};
pub use tx::{
    Propagation, Session, TransactionDefinition, TransactionManager, TransactionStatus, TxError,
    TxResult, TxState,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
