//! Responses domain - submission, budgeted editing, and drafts.

pub mod actions;
pub mod models;

pub use models::*;
