//! Platform domain - the singleton configuration row of tunables.

pub mod models;

pub use models::*;
