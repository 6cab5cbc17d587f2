//! HTTP client for the Nightlight location API.
//!
//! Submissions are form-encoded POSTs with a bearer token. A non-2xx status
//! is a delivery failure; a 2xx body is decoded as `{success, message?, error?}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, StatusCode};

use nightlight::{ApiResponse, DeliveryError, LocationApi, LocationSubmission};

use crate::elapsed_ms;
use crate::settings::CoreConfig;

pub struct LocationClient {
    client: Client,
    location_url: String,
}

impl LocationClient {
    /// Create a client posting to `location_url`.
    pub fn new(location_url: &str, timeout: Duration) -> Result<Self, String> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            location_url: location_url.to_string(),
        })
    }

    pub fn from_config(config: &CoreConfig) -> Result<Self, String> {
        Self::new(
            &config.location_url(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn location_url(&self) -> &str {
        &self.location_url
    }
}

#[async_trait]
impl LocationApi for LocationClient {
    async fn submit_location(
        &self,
        submission: &LocationSubmission,
        auth_token: Option<&str>,
    ) -> Result<ApiResponse, DeliveryError> {
        let start = Instant::now();
        let mut request = self
            .client
            .post(&self.location_url)
            .form(&submission.form_fields());
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("[LocationClient] 401 from {}", self.location_url);
            return Err(DeliveryError::Unauthorized);
        }
        if !status.is_success() {
            warn!(
                "[LocationClient] HTTP {} from {} ({} ms)",
                status.as_u16(),
                self.location_url,
                elapsed_ms(start)
            );
            return Err(DeliveryError::Http {
                status: status.as_u16(),
            });
        }

        let body = response
            .json::<ApiResponse>()
            .await
            .map_err(|e| DeliveryError::Transport(format!("unreadable response: {}", e)))?;

        debug!(
            "[LocationClient] Submitted ({}, {}) success={} ({} ms)",
            submission.latitude,
            submission.longitude,
            body.success,
            elapsed_ms(start)
        );
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn submission() -> LocationSubmission {
        LocationSubmission {
            latitude: 48.27,
            longitude: -114.34,
            accuracy: 5.0,
            source: "test".to_string(),
            timestamp: "2022-06-01T14:42:55.000Z".to_string(),
        }
    }

    async fn client_for(server: &MockServer) -> LocationClient {
        LocationClient::new(
            &format!("{}/api/location", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_form_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/location"))
            .and(header("authorization", "Bearer abc"))
            .and(body_string_contains("actionType=save"))
            .and(body_string_contains("latitude=48.27"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": true, "message": "saved"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client.submit_location(&submission(), Some("abc")).await.unwrap();
        assert!(response.success);
        assert_eq!(response.message.as_deref(), Some("saved"));
    }

    #[tokio::test]
    async fn test_submit_maps_status_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer expired"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(
            client.submit_location(&submission(), Some("expired")).await,
            Err(DeliveryError::Unauthorized)
        );
        assert_eq!(
            client.submit_location(&submission(), Some("abc")).await,
            Err(DeliveryError::Http { status: 503 })
        );
    }

    #[tokio::test]
    async fn test_submit_unreachable_is_transport_error() {
        let client =
            LocationClient::new("http://127.0.0.1:9/api/location", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.submit_location(&submission(), Some("abc")).await,
            Err(DeliveryError::Transport(_))
        ));
    }
}
