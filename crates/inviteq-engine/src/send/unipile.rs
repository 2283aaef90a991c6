//! Unipile send integration
//!
//! Sends connection invites through the Unipile LinkedIn API. Failures
//! are classified for the dispatcher: 429 and 5xx responses plus
//! network errors are transient, any other non-success is permanent.

use async_trait::async_trait;
use inviteq_common::config::UnipileConfig;
use inviteq_common::{Error, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{InviteRequest, SendIntegration, SendOutcome};

#[derive(Serialize)]
struct InviteBody<'a> {
    account_id: &'a str,
    provider_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// Unipile API client
#[derive(Clone)]
pub struct UnipileClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl UnipileClient {
    /// Create a new client from configuration
    pub fn new(config: &UnipileConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Send(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SendIntegration for UnipileClient {
    async fn send_invite(&self, request: &InviteRequest) -> SendOutcome {
        let url = format!("{}/api/v1/users/invite", self.base_url);
        let body = InviteBody {
            account_id: &request.provider_ref,
            provider_id: &request.profile_ref,
            message: request.message.as_deref(),
        };

        let response = match self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                // Timeouts and connection errors may succeed next time.
                return SendOutcome::TransientFailure {
                    error: format!("Request failed: {}", e),
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Invite sent to {}", request.profile_ref);
            return SendOutcome::Sent;
        }

        let detail = response.text().await.unwrap_or_default();
        let error = format!("Unipile returned {}: {}", status, detail);

        if status.as_u16() == 429 || status.is_server_error() {
            SendOutcome::TransientFailure { error }
        } else {
            SendOutcome::PermanentFailure { error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> UnipileConfig {
        UnipileConfig {
            base_url: base_url.to_string(),
            api_key: "test-key".to_string(),
            timeout_secs: 5,
        }
    }

    fn request() -> InviteRequest {
        InviteRequest {
            provider_ref: "acc-123".to_string(),
            profile_ref: "profile-456".to_string(),
            message: Some("Hi, let's connect".to_string()),
        }
    }

    #[tokio::test]
    async fn test_successful_send() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/invite"))
            .and(header("X-API-KEY", "test-key"))
            .and(body_json(serde_json::json!({
                "account_id": "acc-123",
                "provider_id": "profile-456",
                "message": "Hi, let's connect",
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = UnipileClient::new(&config(&server.uri())).unwrap();
        let outcome = client.send_invite(&request()).await;

        assert!(matches!(outcome, SendOutcome::Sent));
    }

    #[tokio::test]
    async fn test_rate_limited_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/invite"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = UnipileClient::new(&config(&server.uri())).unwrap();
        let outcome = client.send_invite(&request()).await;

        match outcome {
            SendOutcome::TransientFailure { error } => {
                assert!(error.contains("429"), "error was: {}", error);
            }
            other => panic!("expected transient failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/invite"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = UnipileClient::new(&config(&server.uri())).unwrap();
        let outcome = client.send_invite(&request()).await;

        assert!(matches!(outcome, SendOutcome::TransientFailure { .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/invite"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string("already connected"),
            )
            .mount(&server)
            .await;

        let client = UnipileClient::new(&config(&server.uri())).unwrap();
        let outcome = client.send_invite(&request()).await;

        match outcome {
            SendOutcome::PermanentFailure { error } => {
                assert!(error.contains("already connected"), "error was: {}", error);
            }
            other => panic!("expected permanent failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_omits_message_when_absent() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/users/invite"))
            .and(body_json(serde_json::json!({
                "account_id": "acc-123",
                "provider_id": "profile-456",
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = UnipileClient::new(&config(&server.uri())).unwrap();
        let mut req = request();
        req.message = None;

        assert!(matches!(client.send_invite(&req).await, SendOutcome::Sent));
    }
}
