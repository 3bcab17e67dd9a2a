//! The scope value type: one `(resource_type, resource_id, action)` grant.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AuthzError;

/// Separator between the three scope fields.
pub const SCOPE_DELIMITER: char = ':';

/// A single capability grant.
///
/// `resource_type` and `resource_id` never contain [`SCOPE_DELIMITER`]; the
/// action may (`s3:GetObject`), since parsing only splits on the first two
/// delimiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Scope {
    resource_type: String,
    resource_id: String,
    action: String,
}

impl Scope {
    /// Build a scope, validating each field.
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self, AuthzError> {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        let action = action.into();

        validate_field("resource_type", &resource_type, true)?;
        validate_field("resource_id", &resource_id, true)?;
        validate_field("action", &action, false)?;

        Ok(Scope {
            resource_type,
            resource_id,
            action,
        })
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// The three fields in canonical order.
    pub fn fields(&self) -> (&str, &str, &str) {
        (&self.resource_type, &self.resource_id, &self.action)
    }
}

pub(crate) fn validate_field(name: &str, value: &str, reject_delimiter: bool) -> Result<(), AuthzError> {
    if value.trim().is_empty() {
        return Err(AuthzError::ScopeValidation(format!(
            "{name} must be non-empty"
        )));
    }
    if reject_delimiter && value.contains(SCOPE_DELIMITER) {
        return Err(AuthzError::ScopeValidation(format!(
            "{name} must not contain '{SCOPE_DELIMITER}'"
        )));
    }
    Ok(())
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{}{SCOPE_DELIMITER}{}{SCOPE_DELIMITER}{}",
            self.resource_type, self.resource_id, self.action
        )
    }
}

impl FromStr for Scope {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, SCOPE_DELIMITER);
        let (Some(resource_type), Some(resource_id), Some(action)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthzError::ScopeParse(s.to_string()));
        };

        if resource_type.is_empty() || resource_id.is_empty() || action.is_empty() {
            return Err(AuthzError::ScopeParse(s.to_string()));
        }

        Scope::new(resource_type, resource_id, action)
    }
}

impl TryFrom<String> for Scope {
    type Error = AuthzError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        document = { "Document:doc1:read", "Document", "doc1", "read" },
        s3_action = { "S3Object:bucket/key.txt:s3:GetObject", "S3Object", "bucket/key.txt", "s3:GetObject" },
        bucket = { "S3Bucket:analytics-data:s3:ListBucket", "S3Bucket", "analytics-data", "s3:ListBucket" },
        wildcard = { "*:*:*", "*", "*", "*" },
    )]
    fn test_scope_from_str(input: &str, rtype: &str, rid: &str, action: &str) {
        let scope: Scope = input.parse().unwrap();
        assert_eq!(scope.fields(), (rtype, rid, action));
        assert_eq!(scope.to_string(), input);
    }

    #[parameterized(
        no_delimiters = { "Document" },
        one_delimiter = { "Document:doc1" },
        empty_type = { ":doc1:read" },
        empty_id = { "Document::read" },
        empty_action = { "Document:doc1:" },
        empty = { "" },
    )]
    fn test_scope_shape_errors(input: &str) {
        assert!(matches!(
            input.parse::<Scope>(),
            Err(AuthzError::ScopeParse(_))
        ));
    }

    #[parameterized(
        blank_type = { "  :doc1:read" },
        blank_action = { "Document:doc1:  " },
    )]
    fn test_scope_validation_errors(input: &str) {
        assert!(matches!(
            input.parse::<Scope>(),
            Err(AuthzError::ScopeValidation(_))
        ));
    }

    #[test]
    fn test_new_rejects_delimiter_in_resource_id() {
        let result = Scope::new("Document", "doc:1", "read");
        assert!(matches!(result, Err(AuthzError::ScopeValidation(msg)) if msg.contains("resource_id")));
    }

    #[test]
    fn test_new_allows_delimiter_in_action() {
        let scope = Scope::new("S3Bucket", "bucket", "s3:ListBucket").unwrap();
        assert_eq!(scope.action(), "s3:ListBucket");
    }

    #[test]
    fn test_scope_serializes_as_canonical_string() {
        let scope = Scope::new("Document", "doc1", "read").unwrap();
        let value = serde_json::to_value(&scope).unwrap();
        assert_eq!(value, serde_json::json!("Document:doc1:read"));

        let back: Scope = serde_json::from_value(value).unwrap();
        assert_eq!(back, scope);
    }

    #[test]
    fn test_scope_deserialize_rejects_malformed() {
        let result: Result<Scope, _> = serde_json::from_value(serde_json::json!("nope"));
        assert!(result.is_err());
    }
}
