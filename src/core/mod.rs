pub mod ci;
pub mod error;
pub mod gitlab;
pub mod note;
pub mod prompt;

pub use ci::CiContext;
pub use error::Error;
pub use gitlab::{FileChange, GitLabClient};
