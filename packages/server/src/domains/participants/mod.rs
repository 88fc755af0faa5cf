//! Participants domain - membership rows and the observer transition engine.
//!
//! The engine governs demotion to observer status, timed reinstatement
//! eligibility, and permanent-observer forfeiture.

pub mod engine;
pub mod models;
pub mod rejoin;

pub use models::*;
pub use rejoin::{RejoinDecision, RejoinDenial};
