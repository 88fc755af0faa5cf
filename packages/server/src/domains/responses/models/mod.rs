pub mod draft;
pub mod response;
pub mod response_edit;

pub use draft::*;
pub use response::*;
pub use response_edit::*;
