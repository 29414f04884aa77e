//! Category domain model.
//!
//! # Responsibility
//! - Define the independently-owned category record.
//! - Provide lifecycle helpers for transient (unsaved) instances.
//!
//! # Invariants
//! - `id` is `None` until first persist and immutable afterwards.
//! - `created_date` is set exactly once; `last_modified_date` is refreshed
//!   on every persisted mutation. Both are epoch milliseconds.

use super::ValidationError;
use serde::{Deserialize, Serialize};

/// Surrogate identifier assigned by storage on first persist.
pub type CategoryId = i64;

/// Independently-owned catalog category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Storage-assigned identity; `None` while transient.
    pub id: Option<CategoryId>,
    pub name: String,
    /// Epoch milliseconds, assigned by storage on insert.
    pub created_date: Option<i64>,
    /// Epoch milliseconds, refreshed by storage on every write.
    pub last_modified_date: Option<i64>,
}

impl Category {
    /// Creates a transient category with no identity or audit fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
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
            return Err(ValidationError::BlankName {
                entity: "category",
            });
        }
        Ok(())
    }
}
