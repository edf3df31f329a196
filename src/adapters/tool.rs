use async_trait::async_trait;

use crate::core::error::Result;

/// Turns review instructions plus one file's diff into review text.
#[async_trait]
pub trait ReviewTool: Send + Sync {
    async fn review(&self, prompt: &str, diff: &str) -> Result<String>;

    fn name(&self) -> &str;
}
