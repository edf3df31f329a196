pub mod cli;
pub mod tool;

pub use cli::CliReviewTool;
pub use tool::ReviewTool;
