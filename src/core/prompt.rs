use std::path::Path;

use crate::core::error::{Error, Result};

/// Reads the review instructions from `path`, trimming surrounding
/// whitespace. The file must exist and contain something.
pub async fn load_prompt(path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path).await.map_err(|err| {
        Error::Config(format!(
            "cannot read prompt file {}: {}",
            path.display(),
            err
        ))
    })?;

    let content = content.trim();
    if content.is_empty() {
        return Err(Error::Config(format!(
            "prompt file {} is empty",
            path.display()
        )));
    }
    Ok(content.to_string())
}

/// Final text handed to the review CLI: instructions first, then the diff,
/// separated by a blank line.
pub fn full_prompt(prompt: &str, diff: &str) -> String {
    format!("{}\n\n{}", prompt.trim(), diff.trim())
}
