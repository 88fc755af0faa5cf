//! Discussions domain - the root aggregate and its creation flow.

pub mod actions;
pub mod models;

pub use models::*;
