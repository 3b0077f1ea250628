use prbot_core::{PullRequestEdit, PullRequestState};
use serde::{Deserialize, Serialize};

/// Webhook event kinds this app subscribes to. Anything else is acknowledged
/// and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Release,
    PullRequest,
}

impl EventKind {
    pub const ALLOWED: [EventKind; 2] = [EventKind::Release, EventKind::PullRequest];

    pub fn from_header(event_type: &str) -> Option<Self> {
        Self::ALLOWED
            .into_iter()
            .find(|kind| kind.as_str() == event_type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Release => "release",
            EventKind::PullRequest => "pull_request",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Release(ReleasePayload),
    PullRequest(PullRequestPayload),
}

impl WebhookEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WebhookEvent::Release(_) => EventKind::Release,
            WebhookEvent::PullRequest(_) => EventKind::PullRequest,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            WebhookEvent::Release(p) => &p.action,
            WebhookEvent::PullRequest(p) => &p.action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasePayload {
    pub action: String,
    pub release: Release,
    pub repository: Option<Repository>,
    pub installation: Option<InstallationRef>,
    pub sender: Option<Account>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: u64,
    pub tag_name: String,
    pub name: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestPayload {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Option<Repository>,
    pub installation: Option<InstallationRef>,
    pub sender: Option<Account>,
}

impl PullRequestPayload {
    /// The edit that re-submits this pull request as received.
    pub fn to_edit(&self) -> PullRequestEdit {
        let pr = &self.pull_request;
        PullRequestEdit {
            number: self.number,
            title: pr.title.clone(),
            body: pr.body.clone(),
            state: pr.state,
            base: Some(pr.base.git_ref.clone()),
            maintainer_can_modify: pr.maintainer_can_modify,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<PullRequestState>,
    pub head: GitRef,
    pub base: GitRef,
    pub maintainer_can_modify: Option<bool>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRef {
    pub sha: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRef {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub login: String,
    #[serde(rename = "type", default)]
    pub account_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: Account,
    pub default_branch: Option<String>,
}
