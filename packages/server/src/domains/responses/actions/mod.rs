pub mod edit;
pub mod submit;

pub use edit::edit;
pub use submit::{save_draft, submit};
