//! Quilt+ package URIs.
//!
//! A package location has the shape
//! `quilt+<storage>://<registry>#package=<name>@<hash>[&path=<logical-path>]`.
//! The hash is mandatory: a package reference is always anchored to one
//! immutable revision.

use std::collections::HashMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};
use utoipa::ToSchema;

use crate::error::AuthzError;
use crate::pattern::{GlobSyntax, glob_match};

const SCHEME_PREFIX: &str = "quilt+";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct QuiltUri {
    pub storage: String,
    pub registry: String,
    pub package_name: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn invalid(msg: &str) -> AuthzError {
    AuthzError::UriParse(msg.to_string())
}

impl QuiltUri {
    pub fn parse(uri: &str) -> Result<Self, AuthzError> {
        if uri.is_empty() {
            return Err(invalid("quilt uri must be a non-empty string"));
        }

        let url = Url::parse(uri).map_err(|_| invalid("quilt uri must start with quilt+ scheme"))?;
        let Some(storage) = url.scheme().strip_prefix(SCHEME_PREFIX) else {
            return Err(invalid("quilt uri must start with quilt+ scheme"));
        };
        if storage.is_empty() {
            return Err(invalid("quilt uri storage type is required"));
        }

        let mut registry = url.host_str().unwrap_or_default().to_string();
        if let Some(port) = url.port() {
            registry.push_str(&format!(":{port}"));
        }
        registry.push_str(url.path());
        let registry = registry.trim_end_matches('/');
        if registry.is_empty() {
            return Err(invalid("quilt uri registry is required"));
        }

        let fragment = url.fragment().unwrap_or_default();
        if fragment.is_empty() {
            return Err(invalid("quilt uri fragment is required"));
        }
        let params = fragment_params(fragment);

        let package = params
            .get("package")
            .filter(|value| !value.is_empty())
            .ok_or_else(|| invalid("quilt uri package parameter is required"))?;
        let (package_name, hash) = package
            .rsplit_once('@')
            .ok_or_else(|| invalid("package value must include an immutable hash"))?;
        if package_name.is_empty() || hash.is_empty() {
            return Err(invalid("package value must include name and hash"));
        }

        let path = match params.get("path") {
            Some(path) if path.is_empty() => {
                return Err(invalid("quilt uri path parameter must be non-empty"));
            }
            Some(path) => Some(path.clone()),
            None => None,
        };

        Ok(QuiltUri {
            storage: storage.to_string(),
            registry: registry.to_string(),
            package_name: package_name.to_string(),
            hash: hash.to_string(),
            path,
        })
    }

    /// Canonical form used for equality across call sites: lower-cased
    /// scheme, no trailing registry slash, forward-slash logical path.
    pub fn normalized(&self) -> String {
        let base = format!(
            "{SCHEME_PREFIX}{}://{}#package={}@{}",
            self.storage.to_ascii_lowercase(),
            self.registry.trim_end_matches('/'),
            self.package_name,
            self.hash
        );
        match &self.path {
            Some(path) => format!("{base}&path={}", path.replace('\\', "/")),
            None => base,
        }
    }

    /// The package reference without any logical path.
    pub fn package_ref(&self) -> String {
        format!("{}@{}", self.package_name, self.hash)
    }
}

/// Percent-decoded `key=value` pairs of the fragment, first value per key.
/// Blank values are kept so that callers can reject them explicitly.
fn fragment_params(fragment: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in form_urlencoded::parse(fragment.as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

impl Display for QuiltUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.normalized())
    }
}

impl FromStr for QuiltUri {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuiltUri::parse(s)
    }
}

/// Parse `uri` and return its canonical form.
pub fn normalize_quilt_uri(uri: &str) -> Result<String, AuthzError> {
    Ok(QuiltUri::parse(uri)?.normalized())
}

/// Validate a URI for authorization use; returns the canonical form.
pub fn validate_quilt_uri(uri: &str) -> Result<String, AuthzError> {
    normalize_quilt_uri(uri)
}

/// Shell-style wildcard match on package names (`*`, `?`), case-sensitive.
pub fn package_name_matches(pattern: &str, package_name: &str) -> bool {
    if pattern.is_empty() || package_name.is_empty() {
        return false;
    }
    glob_match(package_name, pattern, GlobSyntax::Shell)
}
