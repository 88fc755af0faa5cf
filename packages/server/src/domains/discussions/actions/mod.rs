pub mod create;

pub use create::{create_discussion, NewDiscussion};
