pub mod discussion;

pub use discussion::*;
