use async_trait::async_trait;
use octocrab::Octocrab;
use prbot_auth::AuthContext;
use prbot_core::{NewPullRequest, PullRequestEdit, PullRequestRef, PullRequestState, RepoTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GitHubApiError;

/// The two pull request operations the event processors need.
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    async fn create_pull_request(
        &self,
        target: &RepoTarget,
        pr: &NewPullRequest,
    ) -> Result<PullRequestRef, GitHubApiError>;

    async fn edit_pull_request(
        &self,
        target: &RepoTarget,
        edit: &PullRequestEdit,
    ) -> Result<PullRequestRef, GitHubApiError>;
}

#[derive(Debug, Serialize)]
struct CreatePullBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
    maintainer_can_modify: bool,
}

#[derive(Debug, Serialize)]
struct EditPullBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<PullRequestState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maintainer_can_modify: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    url: String,
    html_url: Option<String>,
}

impl From<PullResponse> for PullRequestRef {
    fn from(pr: PullResponse) -> Self {
        PullRequestRef {
            number: pr.number,
            url: pr.html_url.unwrap_or(pr.url),
        }
    }
}

/// Pull request client acting as the App's installation.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    auth: Arc<AuthContext>,
}

impl GitHubClient {
    pub fn new(auth: Arc<AuthContext>) -> Self {
        Self { auth }
    }

    /// Builds an octocrab client carrying a current installation token.
    pub async fn create_octocrab_client(&self) -> Result<Octocrab, GitHubApiError> {
        let token = self
            .auth
            .installation_token()
            .await
            .map_err(GitHubApiError::Auth)?;

        Octocrab::builder()
            .personal_token(token)
            .base_uri(self.auth.api_base())
            .and_then(|builder| builder.build())
            .map_err(GitHubApiError::from_octocrab)
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn create_pull_request(
        &self,
        target: &RepoTarget,
        pr: &NewPullRequest,
    ) -> Result<PullRequestRef, GitHubApiError> {
        tracing::debug!(repo = %target, head = %pr.head, base = %pr.base, "Creating pull request");
        let octocrab = self.create_octocrab_client().await?;
        let route = format!("/repos/{}/{}/pulls", target.owner, target.repo);
        let body = CreatePullBody {
            title: &pr.title,
            head: &pr.head,
            base: &pr.base,
            body: &pr.body,
            maintainer_can_modify: pr.maintainer_can_modify,
        };

        let created: PullResponse = octocrab
            .post(route, Some(&body))
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        Ok(created.into())
    }

    async fn edit_pull_request(
        &self,
        target: &RepoTarget,
        edit: &PullRequestEdit,
    ) -> Result<PullRequestRef, GitHubApiError> {
        tracing::debug!(repo = %target, number = edit.number, "Editing pull request");
        let octocrab = self.create_octocrab_client().await?;
        let route = format!(
            "/repos/{}/{}/pulls/{}",
            target.owner, target.repo, edit.number
        );
        let body = EditPullBody {
            title: edit.title.as_deref(),
            body: edit.body.as_deref(),
            state: edit.state,
            base: edit.base.as_deref(),
            maintainer_can_modify: edit.maintainer_can_modify,
        };

        let edited: PullResponse = octocrab
            .patch(route, Some(&body))
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        Ok(edited.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = include_str!("../../auth/testdata/app-key.pem");

    async fn client_for(server: &MockServer) -> GitHubClient {
        Mock::given(method("GET"))
            .and(path("/orgs/acme/installation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7001,
                "account": { "login": "acme", "type": "Organization" }
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/app/installations/7001/access_tokens"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_installation",
                "expires_at": "2099-01-01T00:00:00Z"
            })))
            .mount(server)
            .await;

        let mut key = tempfile::NamedTempFile::new().unwrap();
        key.write_all(TEST_KEY.as_bytes()).unwrap();
        let auth = AuthContext::bootstrap(42, key.path(), "acme", &server.uri())
            .await
            .unwrap();
        GitHubClient::new(Arc::new(auth))
    }

    fn pull_response(number: u64) -> serde_json::Value {
        json!({
            "number": number,
            "url": format!("https://api.github.com/repos/acme/widgets/pulls/{number}"),
            "html_url": format!("https://github.com/acme/widgets/pull/{number}")
        })
    }

    #[tokio::test]
    async fn creates_release_pull_request() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/pulls"))
            .and(header_exists("authorization"))
            .and(body_json(json!({
                "title": "Hello pull request!",
                "head": "develop",
                "base": "master",
                "body": "This is an automatically created PR.",
                "maintainer_can_modify": true
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(pull_response(3)))
            .expect(1)
            .mount(&server)
            .await;

        let created = client
            .create_pull_request(
                &RepoTarget::new("acme", "widgets"),
                &NewPullRequest::release_template(),
            )
            .await
            .unwrap();

        assert_eq!(created.number, 3);
        assert_eq!(created.url, "https://github.com/acme/widgets/pull/3");
    }

    #[tokio::test]
    async fn duplicate_pull_request_error_is_classified() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/pulls"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{
                    "resource": "PullRequest",
                    "code": "custom",
                    "message": "A pull request already exists for acme:develop."
                }],
                "documentation_url": "https://docs.github.com/rest/pulls/pulls#create-a-pull-request"
            })))
            .mount(&server)
            .await;

        let err = client
            .create_pull_request(
                &RepoTarget::new("acme", "widgets"),
                &NewPullRequest::release_template(),
            )
            .await
            .unwrap_err();

        assert!(err.is_already_exists(), "{err}");
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn edit_sends_only_present_fields() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        Mock::given(method("PATCH"))
            .and(path("/repos/acme/widgets/pulls/12"))
            .and(body_json(json!({
                "title": "Bump deps",
                "state": "open",
                "base": "master"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(pull_response(12)))
            .expect(1)
            .mount(&server)
            .await;

        let edit = PullRequestEdit {
            number: 12,
            title: Some("Bump deps".to_string()),
            body: None,
            state: Some(PullRequestState::Open),
            base: Some("master".to_string()),
            maintainer_can_modify: None,
        };
        let edited = client
            .edit_pull_request(&RepoTarget::new("acme", "widgets"), &edit)
            .await
            .unwrap();

        assert_eq!(edited.number, 12);
    }
}
