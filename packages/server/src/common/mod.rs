//! Shared infrastructure: typed IDs and the domain error taxonomy.

pub mod entity_ids;
pub mod error;
pub mod id;

pub use entity_ids::*;
pub use error::{DomainError, DomainResult};
