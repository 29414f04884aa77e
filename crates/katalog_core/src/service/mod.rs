//! Core use-case services.
//!
//! # Responsibility
//! - Compose repository calls inside transaction boundaries.
//! - Demonstrate that declarative, programmatic, and manual transaction
//!   control are indistinguishable from the caller's perspective.

pub mod category_service;
