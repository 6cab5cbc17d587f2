//! Remote location API capability.
//!
//! The server accepts a form-encoded POST and answers with a loose
//! `{success, message?, error?}` object. [`RemoteDelivery`] pairs the API with
//! the auth token store and collapses that answer into a typed result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DeliveryError;
use crate::payload::LocationPayload;

/// One location submission as sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSubmission {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub source: String,
    /// ISO-8601 capture time
    pub timestamp: String,
}

impl LocationSubmission {
    pub fn from_payload(payload: &LocationPayload, timestamp: &str) -> Self {
        Self {
            latitude: payload.lat,
            longitude: payload.long,
            accuracy: payload.acc,
            source: payload.src.clone(),
            timestamp: timestamp.to_string(),
        }
    }

    /// Form body fields, in wire order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("accuracy", self.accuracy.to_string()),
            ("source", self.source.clone()),
            ("timestamp", self.timestamp.clone()),
            ("actionType", "save".to_string()),
        ]
    }
}

/// Server answer to a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Either an HTTP-like code (`401`) or a message string
    #[serde(default)]
    pub error: Option<Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        match &self.error {
            Some(Value::Number(n)) => n.as_u64() == Some(401),
            Some(Value::String(s)) => s.trim() == "401",
            _ => false,
        }
    }

    /// Best human-readable reason for a failed response.
    pub fn failure_message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        match &self.error {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unsuccessful response".to_string(),
        }
    }
}

/// Remote location endpoint.
#[async_trait]
pub trait LocationApi: Send + Sync {
    async fn submit_location(
        &self,
        submission: &LocationSubmission,
        auth_token: Option<&str>,
    ) -> Result<ApiResponse, DeliveryError>;
}

/// Source of the user's auth token.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// Fixed token, mainly for tests and command-line use.
pub struct StaticToken(pub Option<String>);

#[async_trait]
impl TokenStore for StaticToken {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Delivers payloads through a [`LocationApi`] using tokens from a [`TokenStore`].
pub struct RemoteDelivery<A, T> {
    api: A,
    tokens: T,
}

impl<A: LocationApi, T: TokenStore> RemoteDelivery<A, T> {
    pub fn new(api: A, tokens: T) -> Self {
        Self { api, tokens }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Submit one payload captured at `timestamp`.
    ///
    /// Without a token nothing is sent and `MissingToken` is returned.
    pub async fn deliver(
        &self,
        payload: &LocationPayload,
        timestamp: &str,
    ) -> Result<(), DeliveryError> {
        let token = self.tokens.token().await.ok_or(DeliveryError::MissingToken)?;
        let submission = LocationSubmission::from_payload(payload, timestamp);
        let response = self.api.submit_location(&submission, Some(&token)).await?;

        if response.success {
            Ok(())
        } else if response.is_unauthorized() {
            Err(DeliveryError::Unauthorized)
        } else {
            Err(DeliveryError::Rejected {
                message: response.failure_message(),
            })
        }
    }
}

/// Object-safe delivery seam used by the pipelines.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, payload: &LocationPayload, timestamp: &str)
    -> Result<(), DeliveryError>;
}

#[async_trait]
impl<A: LocationApi, T: TokenStore> Delivery for RemoteDelivery<A, T> {
    async fn deliver(
        &self,
        payload: &LocationPayload,
        timestamp: &str,
    ) -> Result<(), DeliveryError> {
        RemoteDelivery::deliver(self, payload, timestamp).await
    }
}
