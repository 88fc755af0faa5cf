// Each test binary pulls in only the helpers it needs.
#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use harness::TestHarness;
