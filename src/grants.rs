//! Proxy grant strings.
//!
//! A grant is `{action}/{bucket}/{key-prefix}`, e.g.
//! `s3:GetObject/analytics/reports/`. A proxy turns each incoming HTTP
//! request into a request string of the same shape and authorizes it when
//! any grant is a literal prefix of it.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::cedar::{S3_BUCKET, S3_OBJECT};
use crate::error::AuthzError;
use crate::types::SCOPE_DELIMITER;

const BEARER_PREFIX: &str = "Bearer ";
const SERVICE_PREFIX: &str = "s3:";

fn invalid(msg: impl Into<String>) -> AuthzError {
    AuthzError::InvalidRequest(msg.into())
}

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthzError> {
    if header.is_empty() {
        return Err(invalid("Authorization header missing"));
    }
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| invalid("Invalid Authorization header"))?
        .trim();
    if token.is_empty() {
        return Err(invalid("Bearer token missing"));
    }
    Ok(token)
}

/// Build the request string for an S3 path-style request.
///
/// `GET` on a bucket, or with a `list-type` query parameter, is a listing.
pub fn construct_request_string(
    method: &str,
    path: &str,
    query: Option<&HashMap<String, String>>,
) -> Result<String, AuthzError> {
    let method = method.to_uppercase();
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    let Some((bucket, rest)) = parts.split_first() else {
        return Err(invalid("Invalid path: empty"));
    };
    let key = rest.join("/");
    let listing = query.is_some_and(|q| q.contains_key("list-type"));

    let requires_key = |action: &str| -> Result<String, AuthzError> {
        if key.is_empty() {
            return Err(invalid(format!("{method} requires an object key")));
        }
        Ok(format!("{action}/{bucket}/{key}"))
    };

    match method.as_str() {
        "GET" if listing || key.is_empty() => Ok(format!("s3:ListBucket/{bucket}/")),
        "GET" => Ok(format!("s3:GetObject/{bucket}/{key}")),
        "PUT" => requires_key("s3:PutObject"),
        "DELETE" => requires_key("s3:DeleteObject"),
        "HEAD" => requires_key("s3:HeadObject"),
        _ => Err(invalid(format!("Unsupported HTTP method: {method}"))),
    }
}

/// The first grant that is a literal prefix of `request`.
pub fn matching_grant<'a, S: AsRef<str>>(request: &str, grants: &'a [S]) -> Option<&'a str> {
    grants
        .iter()
        .map(AsRef::as_ref)
        .find(|grant| !grant.is_empty() && request.starts_with(grant))
}

pub fn is_authorized<S: AsRef<str>>(request: &str, grants: &[S]) -> bool {
    match matching_grant(request, grants) {
        Some(grant) => {
            debug!(event = "Grant", phase = "Match", request, grant);
            true
        }
        None => {
            let grants: Vec<&str> = grants.iter().map(AsRef::as_ref).collect();
            warn!(event = "Grant", phase = "Deny", request, grants = ?grants);
            false
        }
    }
}

/// Turn a compiled S3 scope into a grant string. Already-formed grants pass
/// through; scopes for other resource types have no grant form.
pub fn convert_scope_to_grant(scope: &str) -> Option<String> {
    if scope.starts_with(SERVICE_PREFIX) && scope.contains('/') {
        return Some(scope.to_string());
    }
    let mut fields = scope.splitn(3, SCOPE_DELIMITER);
    let (Some(resource_type), Some(resource_id), Some(action)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return None;
    };
    match resource_type {
        S3_OBJECT => Some(format!("{action}/{resource_id}")),
        S3_BUCKET => Some(format!("{action}/{}/", resource_id.trim_end_matches('/'))),
        _ => None,
    }
}

pub fn convert_scopes_to_grants<S: AsRef<str>>(scopes: &[S]) -> Vec<String> {
    scopes
        .iter()
        .filter_map(|scope| convert_scope_to_grant(scope.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        plain = { "Bearer abc.def.ghi", "abc.def.ghi" },
        padded = { "Bearer   token  ", "token" },
    )]
    fn test_extract_bearer_token(header: &str, expected: &str) {
        assert_eq!(extract_bearer_token(header).unwrap(), expected);
    }

    #[parameterized(
        missing = { "", "Authorization header missing" },
        basic = { "Basic dXNlcjpwYXNz", "Invalid Authorization header" },
        lowercase = { "bearer token", "Invalid Authorization header" },
        empty_token = { "Bearer    ", "Bearer token missing" },
    )]
    fn test_extract_bearer_token_errors(header: &str, message: &str) {
        assert_eq!(extract_bearer_token(header).unwrap_err(), invalid(message));
    }

    #[parameterized(
        get_object = { "GET", "/bucket/path/to/file.csv", false, "s3:GetObject/bucket/path/to/file.csv" },
        lowercase_method = { "get", "/bucket/file", false, "s3:GetObject/bucket/file" },
        list_bucket = { "GET", "/bucket", false, "s3:ListBucket/bucket/" },
        list_bucket_slash = { "GET", "/bucket/", false, "s3:ListBucket/bucket/" },
        list_type_query = { "GET", "/bucket/prefix", true, "s3:ListBucket/bucket/" },
        put_object = { "PUT", "/bucket/key", false, "s3:PutObject/bucket/key" },
        delete_object = { "DELETE", "/bucket/a//b", false, "s3:DeleteObject/bucket/a/b" },
        head_object = { "HEAD", "bucket/key", false, "s3:HeadObject/bucket/key" },
    )]
    fn test_construct_request_string(method: &str, path: &str, list: bool, expected: &str) {
        let query: HashMap<String, String> = if list {
            HashMap::from([("list-type".to_string(), "2".to_string())])
        } else {
            HashMap::new()
        };
        assert_eq!(
            construct_request_string(method, path, Some(&query)).unwrap(),
            expected
        );
    }

    #[parameterized(
        empty_path = { "GET", "/", "Invalid path: empty" },
        put_bucket = { "PUT", "/bucket", "PUT requires an object key" },
        delete_bucket = { "DELETE", "/bucket/", "DELETE requires an object key" },
        head_bucket = { "HEAD", "/bucket", "HEAD requires an object key" },
        post = { "post", "/bucket/key", "Unsupported HTTP method: POST" },
    )]
    fn test_construct_request_string_errors(method: &str, path: &str, message: &str) {
        assert_eq!(
            construct_request_string(method, path, None).unwrap_err(),
            invalid(message)
        );
    }

    #[test]
    fn test_is_authorized_prefix() {
        let grants = ["s3:GetObject/bucket/reports/", "s3:ListBucket/bucket/"];
        assert!(is_authorized("s3:GetObject/bucket/reports/q1.csv", &grants));
        assert!(is_authorized("s3:ListBucket/bucket/", &grants));
        assert!(!is_authorized("s3:GetObject/bucket/private/q1.csv", &grants));
        assert!(!is_authorized("s3:PutObject/bucket/reports/q1.csv", &grants));
    }

    #[test]
    fn test_empty_grant_never_matches() {
        assert!(!is_authorized("s3:GetObject/bucket/key", &[""]));
        assert!(!is_authorized::<&str>("s3:GetObject/bucket/key", &[]));
    }

    #[parameterized(
        object = { "S3Object:bucket/key.csv:s3:GetObject", Some("s3:GetObject/bucket/key.csv") },
        object_prefix = { "S3Object:bucket/reports/:s3:GetObject", Some("s3:GetObject/bucket/reports/") },
        bucket = { "S3Bucket:bucket:s3:ListBucket", Some("s3:ListBucket/bucket/") },
        bucket_slash = { "S3Bucket:bucket/:s3:ListBucket", Some("s3:ListBucket/bucket/") },
        passthrough = { "s3:GetObject/bucket/", Some("s3:GetObject/bucket/") },
        other_type = { "Document:doc1:read", None },
        malformed = { "S3Object", None },
    )]
    fn test_convert_scope_to_grant(scope: &str, expected: Option<&str>) {
        assert_eq!(convert_scope_to_grant(scope).as_deref(), expected);
    }

    #[test]
    fn test_convert_scopes_to_grants_drops_unconvertible() {
        let scopes = [
            "S3Object:bucket/a.txt:s3:GetObject",
            "Document:doc1:read",
            "S3Bucket:bucket:s3:ListBucket",
        ];
        assert_eq!(
            convert_scopes_to_grants(&scopes),
            vec!["s3:GetObject/bucket/a.txt", "s3:ListBucket/bucket/"]
        );
    }
}
