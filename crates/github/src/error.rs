use thiserror::Error;

/// Substring GitHub puts in the validation error when the head/base pair
/// already has an open pull request.
pub const ALREADY_EXISTS: &str = "A pull request already exists";

#[derive(Debug, Error)]
pub enum GitHubApiError {
    #[error("installation authentication failed: {0:#}")]
    Auth(anyhow::Error),

    #[error("GitHub API error ({}): {message}", display_status(.status))]
    Api { status: Option<u16>, message: String },
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "no status".to_string(), |s| s.to_string())
}

impl GitHubApiError {
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        GitHubApiError::Api {
            status,
            message: message.into(),
        }
    }

    /// Flattens octocrab's error, keeping the per-field validation messages
    /// GitHub returns alongside the top-level "Validation Failed".
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                let mut message = source.message.clone();
                let details: Vec<String> = source
                    .errors
                    .iter()
                    .flatten()
                    .map(|e| {
                        e.get("message")
                            .and_then(|m| m.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(|| e.to_string())
                    })
                    .collect();
                if !details.is_empty() {
                    message = format!("{} [{}]", message, details.join("; "));
                }
                Self::api(Some(source.status_code.as_u16()), message)
            }
            other => Self::api(None, other.to_string()),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubApiError::Api { status, .. } => *status,
            GitHubApiError::Auth(_) => None,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.to_string().contains(ALREADY_EXISTS)
    }
}
