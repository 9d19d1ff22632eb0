//! GraphQL wire envelope shared by all provider operations.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Outgoing GraphQL request body.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

impl GraphqlRequest {
    pub fn new(query: impl Into<String>, variables: serde_json::Value) -> Self {
        Self {
            query: query.into(),
            variables: Some(variables),
        }
    }
}

/// GraphQL response envelope: `data` and `errors` can coexist, and a 200
/// response with populated `errors` is still a rejection.
#[derive(Debug, Deserialize)]
pub struct GraphqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    pub message: String,
}

impl<T: DeserializeOwned> GraphqlResponse<T> {
    /// Collapse the envelope into a plain result: any `errors` entries win
    /// over partial `data`.
    pub fn into_result(self) -> Result<T, Vec<String>> {
        if !self.errors.is_empty() {
            return Err(self.errors.into_iter().map(|e| e.message).collect());
        }
        self.data.ok_or_else(|| vec!["response carried neither data nor errors".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ProjectCreate {
        id: String,
    }

    #[test]
    fn errors_win_over_partial_data() {
        let body = serde_json::json!({
            "data": { "id": "p-1" },
            "errors": [{ "message": "Not Authorized" }]
        });
        let envelope: GraphqlResponse<ProjectCreate> = serde_json::from_value(body).unwrap();

        let err = envelope.into_result().unwrap_err();
        assert_eq!(err, vec!["Not Authorized".to_string()]);
    }

    #[test]
    fn missing_errors_field_deserializes_as_empty() {
        let body = serde_json::json!({ "data": { "id": "p-1" } });
        let envelope: GraphqlResponse<ProjectCreate> = serde_json::from_value(body).unwrap();

        assert_eq!(envelope.into_result().unwrap(), ProjectCreate { id: "p-1".to_string() });
    }
}
