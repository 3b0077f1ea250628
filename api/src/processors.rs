use prbot_core::{NewPullRequest, PullRequestRef, RepoTarget};
use prbot_github::{GitHubApiError, PullRequestApi, PullRequestPayload, ReleasePayload, WebhookEvent};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Created(PullRequestRef),
    Edited(PullRequestRef),
    /// GitHub refused because the branch pair already has an open PR.
    AlreadyExists,
}

impl ProcessOutcome {
    pub fn pull_request(&self) -> Option<&PullRequestRef> {
        match self {
            ProcessOutcome::Created(pr) | ProcessOutcome::Edited(pr) => Some(pr),
            ProcessOutcome::AlreadyExists => None,
        }
    }
}

/// Turns webhook events into pull request calls against one repository.
pub struct Processor {
    api: Arc<dyn PullRequestApi>,
    target: RepoTarget,
}

impl Processor {
    pub fn new(api: Arc<dyn PullRequestApi>, target: RepoTarget) -> Self {
        Self { api, target }
    }

    pub async fn process(&self, event: &WebhookEvent) -> Result<ProcessOutcome, GitHubApiError> {
        match event {
            WebhookEvent::Release(payload) => self.process_release_event(payload).await,
            WebhookEvent::PullRequest(payload) => self.process_pull_request_event(payload).await,
        }
    }

    pub async fn process_release_event(
        &self,
        payload: &ReleasePayload,
    ) -> Result<ProcessOutcome, GitHubApiError> {
        info!(
            action = %payload.action,
            tag = %payload.release.tag_name,
            "Received release event"
        );

        let pr = NewPullRequest::release_template();
        match self.api.create_pull_request(&self.target, &pr).await {
            Ok(created) => {
                info!(url = %created.url, repo = %self.target, "Created pull request");
                Ok(ProcessOutcome::Created(created))
            }
            Err(e) if e.is_already_exists() => {
                debug!(head = %pr.head, base = %pr.base, "Pull request already exists");
                Ok(ProcessOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn process_pull_request_event(
        &self,
        payload: &PullRequestPayload,
    ) -> Result<ProcessOutcome, GitHubApiError> {
        info!(
            action = %payload.action,
            number = payload.number,
            "Received pull request event"
        );

        // Edits never fail with "already exists"; the check mirrors the
        // release path.
        match self.api.edit_pull_request(&self.target, &payload.to_edit()).await {
            Ok(edited) => {
                info!(url = %edited.url, repo = %self.target, "Edited pull request");
                Ok(ProcessOutcome::Edited(edited))
            }
            Err(e) if e.is_already_exists() => {
                debug!(number = payload.number, "Pull request already exists");
                Ok(ProcessOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }
}
