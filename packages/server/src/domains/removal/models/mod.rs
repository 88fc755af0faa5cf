pub mod removal_action;

pub use removal_action::*;
