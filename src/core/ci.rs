//! CI job context resolved from GitLab CI environment variables.

use crate::core::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

/// Everything the pipeline needs to know about the job it runs inside.
///
/// GitLab CI injects `CI_PROJECT_ID`, `CI_MERGE_REQUEST_IID`, and
/// `CI_API_V4_URL` into merge request pipelines; `GITLAB_TOKEN` and the
/// review tool's API key must be provided as CI/CD variables.
#[derive(Debug, Clone)]
pub struct CiContext {
    pub api_url: String,
    pub token: String,
    pub project_id: String,
    pub mr_iid: String,
    /// Review tool API key as (variable name, value), when one is configured.
    pub tool_key: Option<(String, String)>,
}

impl CiContext {
    pub fn from_env(tool_key_var: Option<&str>) -> Result<Self> {
        Self::from_lookup(tool_key_var, |name| std::env::var(name).ok())
    }

    /// Resolves the context through `lookup` so tests can inject variables
    /// without touching the process environment.
    pub fn from_lookup<F>(tool_key_var: Option<&str>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let token = fetch("GITLAB_TOKEN");
        let project_id = fetch("CI_PROJECT_ID");
        let mr_iid = fetch("CI_MERGE_REQUEST_IID");
        let tool_key = tool_key_var.map(|name| (name, fetch(name)));

        let mut missing = Vec::new();
        let mut credential_missing = false;
        if token.is_none() {
            missing.push("GITLAB_TOKEN");
            credential_missing = true;
        }
        if project_id.is_none() {
            missing.push("CI_PROJECT_ID");
        }
        if mr_iid.is_none() {
            missing.push("CI_MERGE_REQUEST_IID");
        }
        if let Some((name, None)) = &tool_key {
            missing.push(*name);
            credential_missing = true;
        }

        match (token, project_id, mr_iid) {
            (Some(token), Some(project_id), Some(mr_iid)) if missing.is_empty() => Ok(Self {
                api_url: fetch("CI_API_V4_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
                token,
                project_id,
                mr_iid,
                tool_key: tool_key
                    .and_then(|(name, value)| value.map(|value| (name.to_string(), value))),
            }),
            _ => {
                let detail = format!(
                    "missing required environment variables: {}",
                    missing.join(", ")
                );
                if credential_missing {
                    Err(Error::Auth(detail))
                } else {
                    Err(Error::Config(detail))
                }
            }
        }
    }
}
