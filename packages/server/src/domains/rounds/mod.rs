//! Rounds domain - turn sequencing, response-period computation, and the
//! discussion termination rules.

pub mod lifecycle;
pub mod models;

pub use models::*;
