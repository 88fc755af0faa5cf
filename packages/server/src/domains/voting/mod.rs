//! Voting domain - parameter ballots, removal votes, join-request ballots,
//! and the once-per-round credit.

pub mod actions;
pub mod credits;
pub mod models;
pub mod tally;

pub use models::*;
