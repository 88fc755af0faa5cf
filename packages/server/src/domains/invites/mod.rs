//! Invites domain - user invite balances and the atomic credit ledger.

pub mod ledger;
pub mod models;

pub use models::*;
