//! Removal domain - the mutual removal mechanic and its audit trail.

pub mod engine;
pub mod models;

pub use models::*;
