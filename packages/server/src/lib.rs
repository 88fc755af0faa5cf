// Discussion Platform - Core
//
// Turn-based group discussion engine: rounds, inter-round parameter voting,
// observer transitions, mutual removal, and the invite-credit economy.
// The HTTP layer consumes this crate; nothing here speaks the wire protocol.

pub mod common;
pub mod config;
pub mod domains;

pub use config::*;
