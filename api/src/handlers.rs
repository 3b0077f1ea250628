use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use prbot_github::{WebhookError, HEADER_DELIVERY, HEADER_EVENT, HEADER_SIGNATURE};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::worker::{EnqueueError, Job};
use crate::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed GitHub event: {0}")]
    Webhook(#[from] WebhookError),

    #[error("malformed GitHub event: invalid HTTP method {0}")]
    InvalidMethod(Method),

    #[error("webhook not queued: {0}")]
    Queue(#[from] EnqueueError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Webhook(_) | ApiError::InvalidMethod(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "prbot",
        "repository": state.config.repo_target().to_string(),
        "jobs": state.stats.snapshot(),
    }))
}

pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let delivery_id = header(&headers, HEADER_DELIVERY).map(str::to_string);

    let event = match state
        .validator
        .parse(
            header(&headers, HEADER_EVENT),
            header(&headers, HEADER_SIGNATURE),
            &body,
        )
    {
        Ok(event) => event,
        Err(WebhookError::UnregisteredEvent(kind)) => {
            info!(event = %kind, delivery_id = ?delivery_id, "Received unregistered GitHub event");
            return Ok(Json(json!({ "status": "ignored" })));
        }
        Err(e) => {
            warn!(error = %e, delivery_id = ?delivery_id, "Received malformed GitHub event");
            return Err(e.into());
        }
    };

    let kind = event.kind();
    info!(event = %kind, action = event.action(), delivery_id = ?delivery_id, "Received GitHub event");

    if let Err(e) = state.queue.enqueue(Job { delivery_id, event }) {
        warn!(event = %kind, error = %e, "Dropping GitHub event");
        return Err(e.into());
    }

    Ok(Json(json!({ "status": "received" })))
}

/// Anything but POST on the webhook route is a malformed delivery.
pub async fn github_webhook_invalid_method(method: Method) -> ApiError {
    warn!(%method, "Received malformed GitHub event");
    ApiError::InvalidMethod(method)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::worker::{JobQueue, WorkerStats};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use prbot_github::{compute_signature, format_signature_header, EventKind, WebhookValidator};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn test_state(capacity: usize) -> (AppState, mpsc::Receiver<Job>) {
        let env: HashMap<&str, &str> = HashMap::from([
            ("ORG_ID", "acme"),
            ("APP_ID", "42"),
            ("CERT_PATH", "/dev/null"),
            ("WEBHOOK_SECRET", SECRET),
            ("REPO_NAME", "widgets"),
        ]);
        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        let stats = Arc::new(WorkerStats::default());
        let (queue, rx) = JobQueue::bounded(capacity, Arc::clone(&stats));
        let state = AppState {
            validator: Arc::new(WebhookValidator::new(config.webhook_secret.as_bytes())),
            config: Arc::new(config),
            queue,
            stats,
        };
        (state, rx)
    }

    fn webhook_request(event_type: &str, body: &Value, secret: &str) -> Request<Body> {
        let bytes = serde_json::to_vec(body).unwrap();
        let signature = format_signature_header(&compute_signature(&bytes, secret.as_bytes()));

        Request::builder()
            .method("POST")
            .uri("/github")
            .header("content-type", "application/json")
            .header(HEADER_EVENT, event_type)
            .header(HEADER_DELIVERY, "72d3162e-cc78-11e3-81ab-4c9367dc0958")
            .header(HEADER_SIGNATURE, signature)
            .body(Body::from(bytes))
            .unwrap()
    }

    fn release_body() -> Value {
        json!({
            "action": "published",
            "release": { "id": 1, "tag_name": "v2.0.0" },
            "installation": { "id": 7001 }
        })
    }

    fn pull_request_body() -> Value {
        json!({
            "action": "opened",
            "number": 5,
            "pull_request": {
                "id": 55,
                "number": 5,
                "title": "Feature",
                "state": "open",
                "head": { "sha": "abc", "ref": "feature" },
                "base": { "sha": "def", "ref": "master" }
            }
        })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn release_is_queued_and_acknowledged() {
        let (state, mut rx) = test_state(8);
        let response = crate::app(state)
            .oneshot(webhook_request("release", &release_body(), SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "received");

        let job = rx.try_recv().unwrap();
        assert_eq!(job.event.kind(), EventKind::Release);
        assert_eq!(
            job.delivery_id.as_deref(),
            Some("72d3162e-cc78-11e3-81ab-4c9367dc0958")
        );
    }

    #[tokio::test]
    async fn pull_request_is_queued() {
        let (state, mut rx) = test_state(8);
        let response = crate::app(state)
            .oneshot(webhook_request("pull_request", &pull_request_body(), SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap().event.kind(), EventKind::PullRequest);
    }

    #[tokio::test]
    async fn unregistered_events_are_acknowledged_without_dispatch() {
        for event_type in ["push", "ping", "issues", "installation"] {
            let (state, mut rx) = test_state(8);
            let response = crate::app(state)
                .oneshot(webhook_request(event_type, &json!({ "zen": "Keep it simple." }), SECRET))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK, "{event_type}");
            assert_eq!(body_json(response).await["status"], "ignored");
            assert!(rx.try_recv().is_err(), "{event_type} was dispatched");
        }
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_without_dispatch() {
        let (state, mut rx) = test_state(8);
        let response = crate::app(state)
            .oneshot(webhook_request("release", &release_body(), "wrong-secret"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let (state, mut rx) = test_state(8);
        let request = Request::builder()
            .method("POST")
            .uri("/github")
            .header(HEADER_EVENT, "release")
            .body(Body::from(serde_json::to_vec(&release_body()).unwrap()))
            .unwrap();

        let response = crate::app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_event_header_is_rejected() {
        let (state, _rx) = test_state(8);
        let request = Request::builder()
            .method("POST")
            .uri("/github")
            .body(Body::from("{}"))
            .unwrap();

        let response = crate::app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let (state, mut rx) = test_state(8);
        let response = crate::app(state)
            .oneshot(webhook_request("release", &json!({ "action": "published" }), SECRET))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("invalid payload"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_answers_service_unavailable() {
        let (state, _rx) = test_state(1);
        let app = crate::app(state.clone());

        let first = app
            .clone()
            .oneshot(webhook_request("release", &release_body(), SECRET))
            .await
            .unwrap();
        let second = app
            .oneshot(webhook_request("release", &release_body(), SECRET))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(state.stats.snapshot().rejected, 1);
    }

    #[tokio::test]
    async fn non_post_webhook_is_malformed() {
        for method in ["GET", "PUT", "DELETE", "PATCH"] {
            let (state, mut rx) = test_state(8);
            let request = Request::builder()
                .method(method)
                .uri("/github")
                .header(HEADER_EVENT, "release")
                .body(Body::empty())
                .unwrap();

            let response = crate::app(state).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{method}");
            assert!(body_json(response).await["error"]
                .as_str()
                .unwrap()
                .contains("invalid HTTP method"));
            assert!(rx.try_recv().is_err(), "{method} was dispatched");
        }
    }

    #[tokio::test]
    async fn health_reports_target_and_counters() {
        let (state, _rx) = test_state(8);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = crate::app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["repository"], "acme/widgets");
        assert_eq!(body["jobs"]["processed"], 0);
    }
}
