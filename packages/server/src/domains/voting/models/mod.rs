pub mod join_request;
pub mod removal_vote;
pub mod vote;

pub use join_request::*;
pub use removal_vote::*;
pub use vote::*;
