// ABOUTME: Execution context carried through a sync run
// ABOUTME: Plain serializable value so it survives being queued for deferred runs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which API surface originated the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    Admin,
    Shop,
    Custom,
}

/// Request-scoped context handed to every adapter call.
///
/// It holds no connections or handles: it can be serialized, sent to a
/// worker and reconstituted there without losing anything adapters rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncContext {
    pub request_id: Uuid,
    pub api_type: ApiType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_token: Option<String>,
    pub language_code: String,
    /// Identifier of the administrator or process that asked for the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl SyncContext {
    pub fn admin(actor: Option<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            api_type: ApiType::Admin,
            channel_token: None,
            language_code: "en".to_string(),
            actor,
            issued_at: Utc::now(),
        }
    }

    pub fn with_channel(mut self, token: impl Into<String>) -> Self {
        self.channel_token = Some(token.into());
        self
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize sync context")
    }

    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).context("Failed to deserialize sync context")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_survives_serialization() {
        let ctx = SyncContext::admin(Some("superadmin".to_string())).with_channel("default");
        let payload = ctx.to_json().unwrap();
        assert!(payload.contains("\"api_type\":\"admin\""));
        let restored = SyncContext::from_json(&payload).unwrap();
        assert_eq!(restored, ctx);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let ctx = SyncContext::admin(None);
        let payload = ctx.to_json().unwrap();
        assert!(!payload.contains("actor"));
        assert!(!payload.contains("channel_token"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(SyncContext::from_json("{\"request_id\": 5}").is_err());
    }
}
