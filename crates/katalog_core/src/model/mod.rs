//! Catalog domain model.
//!
//! # Responsibility
//! - Define the canonical Category and Product records used by core logic.
//! - Validate domain invariants before any persistence attempt.
//!
//! # Invariants
//! - Identity (`id`) is assigned by storage on first persist and never
//!   changes afterwards.
//! - Audit timestamps are owned by storage, not by callers.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod category;
pub mod product;

/// Domain validation failure raised before SQL mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Entity name is empty or whitespace-only.
    BlankName { entity: &'static str },
    /// Product price must be a non-negative currency amount.
    NegativePrice(i64),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName { entity } => write!(f, "{entity} name must not be blank"),
            Self::NegativePrice(price) => {
                write!(f, "product price must be non-negative, got {price}")
            }
        }
    }
}

impl Error for ValidationError {}
