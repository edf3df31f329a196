//! Minimal GitLab REST v4 client covering the endpoints the pipeline needs:
//! merge request lookup, branch heads, diffs, and merge request notes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

use crate::core::error::{Error, Result};

const PRIVATE_TOKEN: &str = "PRIVATE-TOKEN";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: usize = 2;
const BASE_DELAY_MS: u64 = 250;
const NOTES_PER_PAGE: usize = 100;
const MAX_NOTE_PAGES: usize = 10;

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub title: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    /// Head sha of the merge request at fetch time.
    pub sha: String,
    pub web_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Branch {
    pub name: String,
    pub commit: CommitRef,
}

#[derive(Debug, Deserialize)]
pub struct CommitRef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One changed file as GitLab reports it, from either the commit diff
/// endpoint or the merge request changes endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct FileChange {
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub diff: String,
}

impl FileChange {
    pub fn display_path(&self) -> &str {
        if !self.new_path.is_empty() {
            &self.new_path
        } else if !self.old_path.is_empty() {
            &self.old_path
        } else {
            "unknown file"
        }
    }

    /// GitLab returns an empty diff for binary files and for renames with
    /// no content change.
    pub fn has_diff(&self) -> bool {
        !self.diff.trim().is_empty()
    }

    /// Short change label for logs.
    pub fn kind(&self) -> &'static str {
        if self.new_file {
            "added"
        } else if self.deleted_file {
            "deleted"
        } else if self.renamed_file {
            "renamed"
        } else {
            "modified"
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangesResponse {
    changes: Vec<FileChange>,
}

#[derive(Debug, Deserialize)]
pub struct Note {
    pub id: u64,
    #[serde(default)]
    pub body: String,
}

pub struct GitLabClient {
    http: Client,
    base_api: String,
    token: String,
}

impl GitLabClient {
    pub fn new(base_api: &str, token: &str) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("glreview/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| Error::Network(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            base_api: base_api.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub async fn merge_request(&self, project: &str, iid: &str) -> Result<MergeRequest> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}",
            self.base_api,
            encode_path(project),
            iid
        );
        self.get_json(&url).await
    }

    pub async fn branch_head(&self, project: &str, branch: &str) -> Result<Branch> {
        let url = format!(
            "{}/projects/{}/repository/branches/{}",
            self.base_api,
            encode_path(project),
            encode_path(branch)
        );
        self.get_json(&url).await
    }

    /// Diff of a single commit against its parent.
    pub async fn commit_changes(&self, project: &str, sha: &str) -> Result<Vec<FileChange>> {
        let url = format!(
            "{}/projects/{}/repository/commits/{}/diff",
            self.base_api,
            encode_path(project),
            sha
        );
        self.get_json(&url).await
    }

    /// Cumulative change set of the merge request against its target branch.
    pub async fn merge_request_changes(
        &self,
        project: &str,
        iid: &str,
    ) -> Result<Vec<FileChange>> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/changes",
            self.base_api,
            encode_path(project),
            iid
        );
        let response: ChangesResponse = self.get_json(&url).await?;
        Ok(response.changes)
    }

    /// All notes on the merge request. Follows page numbering until a
    /// short page, capped at `MAX_NOTE_PAGES` pages; threads longer than
    /// that are scanned best-effort.
    pub async fn notes(&self, project: &str, iid: &str) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        for page in 1..=MAX_NOTE_PAGES {
            let url = format!(
                "{}/projects/{}/merge_requests/{}/notes?per_page={}&page={}",
                self.base_api,
                encode_path(project),
                iid,
                NOTES_PER_PAGE,
                page
            );
            let batch: Vec<Note> = self.get_json(&url).await?;
            let last_page = batch.len() < NOTES_PER_PAGE;
            notes.extend(batch);
            if last_page {
                break;
            }
        }
        Ok(notes)
    }

    /// Creates a note on the merge request. Never retried: a retry after an
    /// ambiguous failure could publish the same note twice.
    pub async fn post_note(&self, project: &str, iid: &str, body: &str) -> Result<Note> {
        let url = format!(
            "{}/projects/{}/merge_requests/{}/notes",
            self.base_api,
            encode_path(project),
            iid
        );
        let response = self
            .http
            .post(&url)
            .header(PRIVATE_TOKEN, &self.token)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, &body));
        }
        response
            .json()
            .await
            .map_err(|err| Error::Network(format!("failed to parse GitLab response: {err}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get_with_retry(url).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| Error::Network(format!("failed to parse GitLab response: {err}")))
    }

    /// GETs are idempotent, so transient failures (connection errors, 429,
    /// 5xx) are retried with a linear backoff before giving up.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let result = self
                .http
                .get(url)
                .header(PRIVATE_TOKEN, &self.token)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    if !is_retryable_status(status) || attempt >= MAX_RETRIES {
                        return Err(Error::from_status(status, &body));
                    }
                    debug!("GET {} returned {}, retrying", url, status);
                }
                Err(err) => {
                    if attempt >= MAX_RETRIES {
                        return Err(err.into());
                    }
                    debug!("GET {} failed ({}), retrying", url, err);
                }
            }

            attempt += 1;
            sleep(Duration::from_millis(BASE_DELAY_MS * attempt as u64)).await;
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// GitLab accepts either a numeric project id or a URL-encoded
/// `namespace/project` path.
fn encode_path(component: &str) -> String {
    component.replace('/', "%2F")
}
