//! Product domain model.
//!
//! # Responsibility
//! - Define the product record and its many-to-one category reference.
//!
//! # Invariants
//! - `price` is a non-negative integer currency amount.
//! - `category_id` must reference an existing category at commit time; the
//!   reference is non-owning and never cascades.

use super::category::CategoryId;
use super::ValidationError;
use serde::{Deserialize, Serialize};

/// Surrogate identifier assigned by storage on first persist.
pub type ProductId = i64;

/// Catalog product holding a required reference to one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Storage-assigned identity; `None` while transient.
    pub id: Option<ProductId>,
    pub name: String,
    /// Non-negative integer currency unit.
    pub price: i64,
    /// Identity of the owning category.
    pub category_id: CategoryId,
    /// Epoch milliseconds, assigned by storage on insert.
    pub created_date: Option<i64>,
    /// Epoch milliseconds, refreshed by storage on every write.
    pub last_modified_date: Option<i64>,
}

impl Product {
    /// Creates a transient product referencing a persisted category.
    pub fn new(name: impl Into<String>, price: i64, category_id: CategoryId) -> Self {
        Self {
            id: None,
            name: name.into(),
            price,
            category_id,
            created_date: None,
            last_modified_date: None,
        }
    }

    /// Returns whether this instance has been persisted.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Checks domain invariants prior to persistence.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName { entity: "product" });
        }
        if self.price < 0 {
            return Err(ValidationError::NegativePrice(self.price));
        }
        Ok(())
    }
}
