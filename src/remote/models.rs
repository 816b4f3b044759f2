// ABOUTME: Wire structures for the remote admin GraphQL API
// ABOUTME: Requests are serialized to JSON, responses deserialized from JSON

use serde::{Deserialize, Serialize};

use crate::syncer::SyncRecord;

#[derive(Debug, Clone, Serialize)]
pub struct GraphQlRequest<'a> {
    pub query: &'a str,
    pub variables: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<serde_json::Value>,
}

/// One page of a paginated list query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedList<T> {
    pub items: Vec<T>,
    pub total_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProduct {
    pub id: String,
    /// Local id of the product this remote record mirrors.
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SyncRecord for RemoteProduct {
    fn record_id(&self) -> String {
        self.external_id.clone().unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductsData {
    pub products: PaginatedList<RemoteProduct>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductInput {
    pub external_id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductInput {
    pub id: String,
    pub external_id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductData {
    pub create_product: RemoteProduct,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductData {
    pub update_product: RemoteProduct,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteProductData {
    pub delete_product: DeletionResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletionResponse {
    pub result: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of the `login` mutation: either the session or an error result.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LoginResult {
    CurrentUser {
        token: String,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        error_code: String,
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    pub login: LoginResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_product_matches_on_external_id() {
        let mirrored: RemoteProduct = serde_json::from_value(serde_json::json!({
            "id": "88",
            "externalId": "P1",
            "name": "Chair",
            "slug": "chair"
        }))
        .unwrap();
        assert_eq!(mirrored.record_id(), "P1");

        let native: RemoteProduct = serde_json::from_value(serde_json::json!({
            "id": "89",
            "name": "Desk",
            "slug": "desk",
            "updatedAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(native.record_id(), "89");
    }

    #[test]
    fn test_login_result_variants() {
        let ok: LoginData =
            serde_json::from_value(serde_json::json!({"login": {"token": "abc"}})).unwrap();
        assert!(matches!(ok.login, LoginResult::CurrentUser { ref token } if token == "abc"));

        let failed: LoginData = serde_json::from_value(serde_json::json!({
            "login": {"errorCode": "INVALID_CREDENTIALS_ERROR", "message": "bad password"}
        }))
        .unwrap();
        assert!(matches!(failed.login, LoginResult::Error { .. }));
    }

    #[test]
    fn test_graphql_request_serialization() {
        let request = GraphQlRequest {
            query: "query { products { totalItems } }",
            variables: serde_json::json!({"options": {"skip": 0, "take": 100}}),
        };
        let parsed = serde_json::to_value(&request).unwrap();
        assert_eq!(parsed["variables"]["options"]["take"], 100);
    }
}
