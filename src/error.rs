use cedar_policy::ParseErrors;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid quilt uri: {0}")]
    UriParse(String),

    #[error("failed to parse policy: {0}")]
    PolicyParse(String),

    #[error("resource hierarchy violation: {0}")]
    HierarchyViolation(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("unsupported policy: {0}")]
    UnsupportedPolicy(String),

    #[error("scope must match 'ResourceType:ResourceId:Action': {0}")]
    ScopeParse(String),

    #[error("invalid scope: {0}")]
    ScopeValidation(String),

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("schema validation failed: {0}")]
    Schema(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),
}

impl AuthzError {
    /// True for the two token failure kinds, used to pick the deny reason.
    pub fn is_token_error(&self) -> bool {
        matches!(self, AuthzError::TokenExpired | AuthzError::TokenInvalid(_))
    }
}

impl From<ParseErrors> for AuthzError {
    fn from(err: ParseErrors) -> Self {
        AuthzError::PolicyParse(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthzError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthzError::TokenExpired,
            _ => AuthzError::TokenInvalid(err.to_string()),
        }
    }
}
