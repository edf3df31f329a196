//! Review note bodies and the hidden marker used to skip re-reviews.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::gitlab::Note;

static MARKER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--\s*REVIEWED_COMMIT:([0-9a-fA-F]+)\s*-->").unwrap());

/// HTML comment embedded in every posted note. Invisible in the GitLab UI
/// but recoverable from the note body on later runs.
pub fn reviewed_marker(sha: &str) -> String {
    format!("<!-- REVIEWED_COMMIT:{sha} -->")
}

/// Commit shas already reviewed on this merge request, extracted from
/// existing note bodies. Notes without a marker are ignored.
pub fn reviewed_commits(notes: &[Note]) -> HashSet<String> {
    let mut shas = HashSet::new();
    for note in notes {
        for caps in MARKER_PATTERN.captures_iter(&note.body) {
            if let Some(sha) = caps.get(1) {
                shas.insert(sha.as_str().to_string());
            }
        }
    }
    shas
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

/// Full body for a per-file review note: marker first, then a heading
/// naming the file and commit, then the review text as-is.
pub fn review_note_body(sha: &str, file_path: &str, review: &str) -> String {
    format!(
        "{}\n\n### 🤖 Automated review: `{}` (commit {})\n\n{}",
        reviewed_marker(sha),
        file_path,
        short_sha(sha),
        review
    )
}
