use serde::{Deserialize, Serialize};

pub const RELEASE_PR_TITLE: &str = "Hello pull request!";
pub const RELEASE_PR_BODY: &str = "This is an automatically created PR.";
pub const RELEASE_PR_HEAD: &str = "develop";
pub const RELEASE_PR_BASE: &str = "master";

/// The owner/repository pair every outbound pull request call is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub owner: String,
    pub repo: String,
}

impl RepoTarget {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl std::fmt::Display for RepoTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A pull request to be opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
    pub maintainer_can_modify: bool,
}

impl NewPullRequest {
    /// The fixed pull request opened whenever a release is published.
    pub fn release_template() -> Self {
        Self {
            title: RELEASE_PR_TITLE.to_string(),
            head: RELEASE_PR_HEAD.to_string(),
            base: RELEASE_PR_BASE.to_string(),
            body: RELEASE_PR_BODY.to_string(),
            maintainer_can_modify: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
}

/// Fields forwarded to an edit of an existing pull request. `None` leaves the
/// field untouched upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEdit {
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<PullRequestState>,
    pub base: Option<String>,
    pub maintainer_can_modify: Option<bool>,
}

/// What the upstream API handed back for a created or edited pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}
