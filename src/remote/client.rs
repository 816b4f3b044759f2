// ABOUTME: HTTP client for the remote admin GraphQL API
// ABOUTME: Validates endpoint and credentials up front and classifies error responses

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::models::{GraphQlRequest, GraphQlResponse};
use crate::error::SyncError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AdminClient {
    client: Client,
    endpoint: Url,
    bearer_token: Option<String>,
}

impl AdminClient {
    /// Creates an unauthenticated client. Only the login mutation works
    /// without a bearer token.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = parse_endpoint(endpoint)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            bearer_token: None,
        })
    }

    /// Creates a client that sends `Authorization: Bearer <token>` on every
    /// request. An empty token is a configuration error.
    pub fn authenticated(endpoint: &str, token: &str, timeout: Duration) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SyncError::config("admin API token is empty").into());
        }
        let mut client = Self::new(endpoint, timeout)?;
        client.bearer_token = Some(token.to_string());
        Ok(client)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// Executes a GraphQL operation and returns its `data` payload.
    pub async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&GraphQlRequest { query, variables });

        if let Some(ref token) = self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach admin API at {}", self.endpoint))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message: "authentication failed; the admin token may be invalid or expired"
                    .to_string(),
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Remote {
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        let payload: GraphQlResponse<T> = response
            .json()
            .await
            .context("Failed to parse admin API response")?;

        if !payload.errors.is_empty() {
            for err in &payload.errors {
                tracing::error!(
                    extensions = ?err.extensions,
                    "[GraphQLError] {}",
                    err.message
                );
            }
            return Err(SyncError::GraphQl(
                payload.errors.into_iter().map(|e| e.message).collect(),
            )
            .into());
        }

        payload
            .data
            .ok_or_else(|| anyhow::anyhow!("Admin API response contained no data"))
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(SyncError::config("admin API URL is empty").into());
    }
    let url = Url::parse(trimmed)
        .map_err(|e| SyncError::config(format!("invalid admin API URL '{trimmed}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SyncError::config(format!(
            "admin API URL must use http or https, got '{other}'"
        ))
        .into()),
    }
}
