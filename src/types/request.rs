//! Incoming access requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::AuthzError;

use super::scope::{Scope, validate_field};

/// A generic scope-checked request, e.g. `S3Object` / `bucket/key.csv` / `s3:GetObject`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AuthRequest {
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub context: Option<Map<String, Value>>,
}

impl AuthRequest {
    /// Create a request, applying the same field rules as [`Scope`].
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self, AuthzError> {
        let request = AuthRequest {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: action.into(),
            context: None,
        };
        validate_field("resource_type", &request.resource_type, true)?;
        validate_field("resource_id", &request.resource_id, true)?;
        validate_field("action", &request.action, false)?;
        Ok(request)
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// The canonical scope this request asks for.
    pub fn scope(&self) -> Result<Scope, AuthzError> {
        Scope::new(
            self.resource_type.as_str(),
            self.resource_id.as_str(),
            self.action.as_str(),
        )
    }
}

/// A request against package-backed data: one object and one action.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
pub struct PackageAccessRequest {
    pub bucket: String,
    pub key: String,
    pub action: String,
}

impl PackageAccessRequest {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        PackageAccessRequest {
            bucket: bucket.into(),
            key: key.into(),
            action: action.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_json_snapshot;

    #[test]
    fn test_auth_request_scope() {
        let request = AuthRequest::new("S3Object", "bucket/key.csv", "s3:GetObject").unwrap();
        assert_eq!(
            request.scope().unwrap().to_string(),
            "S3Object:bucket/key.csv:s3:GetObject"
        );
    }

    #[test]
    fn test_auth_request_rejects_colon_in_id() {
        assert!(AuthRequest::new("Document", "doc:1", "read").is_err());
    }

    #[test]
    fn test_auth_request_rejects_blank_action() {
        assert!(AuthRequest::new("Document", "doc1", " ").is_err());
    }

    #[test]
    fn test_auth_request_serialization() {
        let mut context = Map::new();
        context.insert("ip".into(), Value::String("10.0.0.1".into()));
        let request = AuthRequest::new("Document", "doc1", "read")
            .unwrap()
            .with_context(context);

        assert_json_snapshot!(request, @r#"
        {
          "resource_type": "Document",
          "resource_id": "doc1",
          "action": "read",
          "context": {
            "ip": "10.0.0.1"
          }
        }
        "#);
    }

    #[test]
    fn test_package_request_round_trip() {
        let request = PackageAccessRequest::new("bucket", "data/file.csv", "s3:GetObject");
        let value = serde_json::to_value(&request).unwrap();
        let back: PackageAccessRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }
}
