//! Error types shared across the pipeline.
//!
//! Every fallible step maps into one of these variants so the binary can
//! exit non-zero with a single rendered message. HTTP statuses from GitLab
//! are folded in via [`Error::from_status`].

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or rejected credentials (environment or HTTP 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Project, merge request, branch, or commit could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport failure, timeout, or an unexpected HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The review CLI is missing, timed out, or exited non-zero.
    #[error("review tool failed: {0}")]
    ToolInvocation(String),

    /// The review CLI exited successfully but printed nothing.
    #[error("review tool produced no output")]
    EmptyResult,

    /// Bad or missing configuration (CI identifiers, prompt file, command).
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = body.trim();
        let detail = if body.is_empty() { "<no body>" } else { body };
        match status.as_u16() {
            401 | 403 => Error::Auth(format!("GitLab API returned {status}: {detail}")),
            404 => Error::NotFound(format!("GitLab API returned 404: {detail}")),
            _ => Error::Network(format!("GitLab API returned {status}: {detail}")),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Error::Network(format!("request timed out: {err}"));
        }
        if let Some(status) = err.status() {
            return Error::from_status(status, &err.to_string());
        }
        Error::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = Error::from_status(StatusCode::UNAUTHORIZED, "401 Unauthorized");
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn forbidden_maps_to_auth() {
        let err = Error::from_status(StatusCode::FORBIDDEN, "insufficient scope");
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn missing_resource_maps_to_not_found() {
        let err = Error::from_status(StatusCode::NOT_FOUND, "{\"message\":\"404 Not Found\"}");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn other_statuses_map_to_network() {
        for status in [
            StatusCode::UNPROCESSABLE_ENTITY,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let err = Error::from_status(status, "");
            assert!(matches!(err, Error::Network(_)), "status {status}");
        }
    }

    #[test]
    fn empty_body_is_labelled() {
        let err = Error::from_status(StatusCode::BAD_GATEWAY, "  ");
        assert!(err.to_string().contains("<no body>"));
    }
}
