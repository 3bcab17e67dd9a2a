//! Physical S3 addresses.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AuthzError;

const S3_SCHEME: &str = "s3://";

/// A physical object address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
}

impl S3Location {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        S3Location {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl Display for S3Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{S3_SCHEME}{}/{}", self.bucket, self.key)
    }
}

impl FromStr for S3Location {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, key) = parse_s3_path(s)?;
        Ok(S3Location { bucket, key })
    }
}

/// Split `s3://bucket/key` into its bucket and key.
///
/// The key keeps any further `/` separators.
pub fn parse_s3_path(value: &str) -> Result<(String, String), AuthzError> {
    if value.trim().is_empty() {
        return Err(AuthzError::InvalidRequest(
            "logical s3 path must be non-empty".into(),
        ));
    }
    let Some(path) = value.strip_prefix(S3_SCHEME) else {
        return Err(AuthzError::InvalidRequest(
            "logical s3 path must start with s3://".into(),
        ));
    };
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(AuthzError::InvalidRequest(
            "logical s3 path must include bucket and key".into(),
        )),
    }
}
