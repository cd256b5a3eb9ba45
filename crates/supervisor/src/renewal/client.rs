//! The renewal call
//!
//! One HTTPS POST with an empty JSON object, classified by status code:
//!
//! | Response            | Outcome                                 |
//! |---------------------|-----------------------------------------|
//! | `200`               | [`RenewalOutcome::Success`]             |
//! | `400`               | [`RenewalOutcome::AlreadyRenewedToday`] |
//! | anything else       | [`RenewalOutcome::Failure`]             |
//! | network / timeout   | [`RenewalOutcome::Failure`]             |

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use tracing::{debug, error, info};
use warden_config::RenewalSettings;

use super::scheduler::ScheduledTask;

/// Result of one renewal tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// The lease was extended
    Success,
    /// The server reports the lease was already extended today
    AlreadyRenewedToday,
    /// The call failed; `status` is `None` for network errors and timeouts
    Failure { status: Option<u16>, detail: String },
}

impl RenewalOutcome {
    /// Classify an HTTP response
    pub fn from_response(status: u16, body: String) -> Self {
        match status {
            200 => Self::Success,
            400 => Self::AlreadyRenewedToday,
            _ => Self::Failure {
                status: Some(status),
                detail: body,
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

impl fmt::Display for RenewalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("renewed"),
            Self::AlreadyRenewedToday => f.write_str("already renewed today"),
            Self::Failure {
                status: Some(status),
                detail,
            } => write!(f, "failed with HTTP {}: {}", status, detail),
            Self::Failure {
                status: None,
                detail,
            } => write!(f, "request failed: {}", detail),
        }
    }
}

/// Where renewals go and who they claim to be from
#[derive(Clone)]
pub struct RenewalEndpoint {
    pub url: String,
    pub api_key: String,
    pub user_agent: String,
}

impl fmt::Debug for RenewalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalEndpoint")
            .field("url", &self.url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Performs renewal calls against one endpoint
pub struct RenewalClient {
    client: reqwest::Client,
    endpoint: RenewalEndpoint,
}

impl RenewalClient {
    /// Create a client
    ///
    /// `connect_timeout` bounds connection setup; the whole exchange is
    /// bounded by `connect_timeout + read_timeout`.
    pub fn new(
        endpoint: RenewalEndpoint,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout + read_timeout)
            .build()?;

        Ok(Self { client, endpoint })
    }

    /// Create a client from settings, or `None` when renewal is not configured
    pub fn from_settings(settings: &RenewalSettings) -> Result<Option<Self>, reqwest::Error> {
        let (Some(url), Some(api_key)) = (&settings.endpoint, &settings.api_key) else {
            return Ok(None);
        };

        let endpoint = RenewalEndpoint {
            url: url.clone(),
            api_key: api_key.clone(),
            user_agent: settings.user_agent.clone(),
        };
        Self::new(
            endpoint,
            settings.connect_timeout(),
            settings.read_timeout(),
        )
        .map(Some)
    }

    /// Perform one renewal call
    ///
    /// Never fails: every error is folded into [`RenewalOutcome::Failure`]
    /// and logged.
    pub async fn renew(&self) -> RenewalOutcome {
        info!(endpoint = %self.endpoint.url, "Attempting lease renewal");

        let outcome = match self.send().await {
            Ok((status, body)) => RenewalOutcome::from_response(status, body),
            Err(e) => RenewalOutcome::Failure {
                status: None,
                detail: describe_error(&e),
            },
        };

        match &outcome {
            RenewalOutcome::Success => {
                info!(endpoint = %self.endpoint.url, "Lease renewed");
            }
            RenewalOutcome::AlreadyRenewedToday => {
                info!(
                    endpoint = %self.endpoint.url,
                    "Server reports the lease was already renewed today"
                );
            }
            RenewalOutcome::Failure {
                status: Some(status),
                detail,
            } => {
                error!(
                    endpoint = %self.endpoint.url,
                    status = status,
                    body = %detail,
                    "Lease renewal failed"
                );
            }
            RenewalOutcome::Failure {
                status: None,
                detail,
            } => {
                error!(
                    endpoint = %self.endpoint.url,
                    error = %detail,
                    "Lease renewal request failed"
                );
            }
        }

        outcome
    }

    async fn send(&self) -> Result<(u16, String), reqwest::Error> {
        let response = self
            .client
            .post(&self.endpoint.url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.endpoint.user_agent)
            .bearer_auth(&self.endpoint.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status = status, body_len = body.len(), "Renewal response received");

        Ok((status, flatten_body(&body)))
    }
}

impl fmt::Debug for RenewalClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenewalClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl ScheduledTask for RenewalClient {
    fn name(&self) -> &str {
        "lease-renewal"
    }

    async fn run(&self) {
        self.renew().await;
    }
}

/// Render a request error with its whole source chain
///
/// reqwest's top-level message is the same for timeouts, refused
/// connections and TLS failures; the cause is only in the sources.
fn describe_error(error: &reqwest::Error) -> String {
    let mut detail = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }

    if error.is_timeout() {
        format!("timed out: {}", detail)
    } else {
        detail
    }
}

/// Trim every line of a response body and join them
fn flatten_body(body: &str) -> String {
    body.lines().map(str::trim).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, read_timeout: Duration) -> RenewalClient {
        let endpoint = RenewalEndpoint {
            url: format!("{}/api/client/servers/abc/renew", server.uri()),
            api_key: "test-key".to_string(),
            user_agent: "warden-test/1.0".to_string(),
        };
        RenewalClient::new(endpoint, Duration::from_secs(2), read_timeout).unwrap()
    }

    async fn mount_status(server: &MockServer, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path("/api/client/servers/abc/renew"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            RenewalOutcome::from_response(200, String::new()),
            RenewalOutcome::Success
        );
        assert_eq!(
            RenewalOutcome::from_response(400, "already".to_string()),
            RenewalOutcome::AlreadyRenewedToday
        );
        assert_eq!(
            RenewalOutcome::from_response(500, "boom".to_string()),
            RenewalOutcome::Failure {
                status: Some(500),
                detail: "boom".to_string()
            }
        );
        assert!(RenewalOutcome::from_response(201, String::new()).is_failure());
        assert!(RenewalOutcome::from_response(401, String::new()).is_failure());
    }

    #[test]
    fn test_flatten_body() {
        assert_eq!(flatten_body("  {\n  \"error\": \"x\"\n}  "), "{\"error\": \"x\"}");
        assert_eq!(flatten_body(""), "");
    }

    #[tokio::test]
    async fn test_sends_expected_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/client/servers/abc/renew"))
            .and(header("accept", "application/json"))
            .and(header("content-type", "application/json"))
            .and(header("authorization", "Bearer test-key"))
            .and(header("user-agent", "warden-test/1.0"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Duration::from_secs(2));
        assert_eq!(client.renew().await, RenewalOutcome::Success);
    }

    #[tokio::test]
    async fn test_already_renewed() {
        let server = MockServer::start().await;
        mount_status(&server, 400, "{\"errors\":[\"renewed today\"]}").await;

        let client = client_for(&server, Duration::from_secs(2));
        assert_eq!(client.renew().await, RenewalOutcome::AlreadyRenewedToday);
    }

    #[tokio::test]
    async fn test_server_error_captures_body() {
        let server = MockServer::start().await;
        mount_status(&server, 500, "  internal\n  error  \n").await;

        let client = client_for(&server, Duration::from_secs(2));
        let outcome = client.renew().await;

        assert_eq!(
            outcome,
            RenewalOutcome::Failure {
                status: Some(500),
                detail: "internalerror".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let endpoint = RenewalEndpoint {
            url: server.uri(),
            api_key: "k".to_string(),
            user_agent: "ua".to_string(),
        };
        let client =
            RenewalClient::new(endpoint, Duration::from_millis(100), Duration::from_millis(200))
                .unwrap();

        match client.renew().await {
            RenewalOutcome::Failure {
                status: None,
                detail,
            } => assert!(detail.starts_with("timed out: "), "detail: {}", detail),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let endpoint = RenewalEndpoint {
            url: format!("http://127.0.0.1:{}/renew", port),
            api_key: "k".to_string(),
            user_agent: "ua".to_string(),
        };
        let client =
            RenewalClient::new(endpoint, Duration::from_secs(1), Duration::from_secs(1)).unwrap();

        match client.renew().await {
            RenewalOutcome::Failure {
                status: None,
                detail,
            } => {
                assert!(!detail.starts_with("timed out"), "detail: {}", detail);
                assert!(detail.to_lowercase().contains("refused"), "detail: {}", detail);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_disabled_settings_build_no_client() {
        let settings = RenewalSettings::default();
        assert!(RenewalClient::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let endpoint = RenewalEndpoint {
            url: "https://panel.example.com".to_string(),
            api_key: "ptlc_secret".to_string(),
            user_agent: "ua".to_string(),
        };
        assert!(!format!("{:?}", endpoint).contains("ptlc_secret"));
    }
}
