//! HS256 tokens carrying scopes, proxy grants, package grants or
//! translation grants.
//!
//! A [`TokenService`] owns the signing key and issuance defaults. The free
//! functions take the secret on every call and build a throwaway service.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{Display, EnumString};
use tracing::debug;
use utoipa::ToSchema;

use crate::error::AuthzError;
use crate::quilt_uri::validate_quilt_uri;
use crate::traits::SecretProvider;
use crate::types::parse_s3_path;

pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// What a package or translation token lets its holder do.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TokenMode {
    Read,
}

impl TokenMode {
    fn parse_claim(mode: &str) -> Result<Self, AuthzError> {
        mode.parse()
            .map_err(|_| AuthzError::TokenInvalid(format!("unsupported token mode: {mode}")))
    }
}

/// The authority a token carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grant {
    /// Compiled `Type:id:action` scopes.
    Scopes { scopes: Vec<String> },
    /// Pre-formed proxy grant strings such as `s3:GetObject/bucket/prefix/`.
    Grants { grants: Vec<String> },
    /// Read access to the objects of one immutable package revision.
    Package { quilt_uri: String, mode: TokenMode },
    /// Access to one logical object, resolved through the package manifest.
    Translation {
        quilt_uri: String,
        mode: TokenMode,
        logical_bucket: String,
        logical_key: String,
    },
}

impl Grant {
    pub fn kind(&self) -> &'static str {
        match self {
            Grant::Scopes { .. } => "scopes",
            Grant::Grants { .. } => "grants",
            Grant::Package { .. } => "package",
            Grant::Translation { .. } => "translation",
        }
    }
}

/// A validated token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Token {
    pub subject: String,
    pub grant: Grant,
    pub issued_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience: Vec<String>,
}

impl Token {
    /// Expired from the `exp` second on, the same rule validation applies
    /// with zero leeway.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Scope strings of a scope token; empty for every other grant.
    pub fn scopes(&self) -> &[String] {
        match &self.grant {
            Grant::Scopes { scopes } => scopes,
            _ => &[],
        }
    }
}

/// Signing secret and issuance defaults.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub default_ttl_seconds: u64,
    /// Clock skew tolerated when checking `exp`.
    pub leeway_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            secret: String::new(),
            issuer: None,
            audience: Vec::new(),
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            leeway_seconds: 0,
        }
    }
}

impl Debug for TokenConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("default_ttl_seconds", &self.default_ttl_seconds)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        TokenConfig {
            secret: secret.into(),
            ..TokenConfig::default()
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience<I, S>(mut self, audience: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audience = audience.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_ttl(mut self, seconds: u64) -> Self {
        self.default_ttl_seconds = seconds;
        self
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

/// Issues and validates tokens with one secret. Cheap to clone.
#[derive(Clone)]
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Debug for TokenService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Result<Self, AuthzError> {
        if config.secret.is_empty() {
            return Err(AuthzError::TokenInvalid(
                "signing secret must be non-empty".to_string(),
            ));
        }
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Ok(TokenService {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Build a service whose secret comes from `provider`, replacing any
    /// secret already in `config`.
    pub fn from_provider<P: SecretProvider + ?Sized>(
        provider: &P,
        config: TokenConfig,
    ) -> Result<Self, AuthzError> {
        let secret = provider.signing_secret()?;
        TokenService::new(TokenConfig { secret, ..config })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn create_token(
        &self,
        subject: &str,
        scopes: &[String],
        ttl: Option<u64>,
    ) -> Result<String, AuthzError> {
        self.issue(
            subject,
            &Grant::Scopes {
                scopes: scopes.to_vec(),
            },
            ttl,
        )
    }

    pub fn create_token_with_grants(
        &self,
        subject: &str,
        grants: &[String],
        ttl: Option<u64>,
    ) -> Result<String, AuthzError> {
        self.issue(
            subject,
            &Grant::Grants {
                grants: grants.to_vec(),
            },
            ttl,
        )
    }

    pub fn create_token_with_package_grant(
        &self,
        subject: &str,
        quilt_uri: &str,
        mode: &str,
        ttl: Option<u64>,
    ) -> Result<String, AuthzError> {
        let grant = Grant::Package {
            quilt_uri: validate_quilt_uri(quilt_uri)?,
            mode: TokenMode::parse_claim(mode)?,
        };
        self.issue(subject, &grant, ttl)
    }

    pub fn create_token_with_package_map(
        &self,
        subject: &str,
        quilt_uri: &str,
        mode: &str,
        logical_bucket: &str,
        logical_key: &str,
        ttl: Option<u64>,
    ) -> Result<String, AuthzError> {
        if logical_bucket.is_empty() || logical_key.is_empty() {
            return Err(AuthzError::TokenInvalid(
                "logical bucket and key must be non-empty".to_string(),
            ));
        }
        let grant = Grant::Translation {
            quilt_uri: validate_quilt_uri(quilt_uri)?,
            mode: TokenMode::parse_claim(mode)?,
            logical_bucket: logical_bucket.to_string(),
            logical_key: logical_key.to_string(),
        };
        self.issue(subject, &grant, ttl)
    }

    /// Sign a token for any grant.
    pub fn issue(&self, subject: &str, grant: &Grant, ttl: Option<u64>) -> Result<String, AuthzError> {
        if subject.is_empty() {
            return Err(AuthzError::TokenInvalid(
                "subject must be non-empty".to_string(),
            ));
        }
        let issued_at = unix_now();
        let expires_at = issued_at.saturating_add(ttl.unwrap_or(self.config.default_ttl_seconds));

        let mut claims = Map::new();
        claims.insert("sub".into(), Value::from(subject));
        claims.insert("iat".into(), Value::from(issued_at));
        claims.insert("exp".into(), Value::from(expires_at));
        if let Some(issuer) = &self.config.issuer {
            claims.insert("iss".into(), Value::from(issuer.as_str()));
        }
        match self.config.audience.as_slice() {
            [] => {}
            [single] => {
                claims.insert("aud".into(), Value::from(single.as_str()));
            }
            many => {
                claims.insert("aud".into(), Value::from(many.to_vec()));
            }
        }
        insert_grant_claims(&mut claims, grant);

        debug!(
            event = "Token",
            phase = "Issue",
            subject,
            grant = grant.kind(),
            expires_at,
        );
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Validate a scope token.
    pub fn validate_token(&self, token: &str) -> Result<Token, AuthzError> {
        let claims = self.verified_claims(token)?;
        let scopes = string_list_claim(&claims, "scopes")?;
        build_token(&claims, Grant::Scopes { scopes })
    }

    /// Validate a package-grant token.
    pub fn validate_package_token(&self, token: &str) -> Result<Token, AuthzError> {
        let claims = self.verified_claims(token)?;
        let grant = package_grant(&claims)?;
        build_token(&claims, grant)
    }

    /// Validate a translation-grant token.
    pub fn validate_package_map_token(&self, token: &str) -> Result<Token, AuthzError> {
        let claims = self.verified_claims(token)?;
        let grant = translation_grant(&claims)?;
        build_token(&claims, grant)
    }

    /// Validate a token of any grant kind. Logical-path claims make it a
    /// translation grant, a `quilt_uri` alone a package grant, a `grants`
    /// list a proxy grant; otherwise it is a scope token.
    pub fn validate(&self, token: &str) -> Result<Token, AuthzError> {
        let claims = self.verified_claims(token)?;
        let grant = if has_logical_claims(&claims) {
            translation_grant(&claims)?
        } else if claims.get("quilt_uri").is_some_and(|v| !v.is_null()) {
            package_grant(&claims)?
        } else if claims.contains_key("grants") {
            Grant::Grants {
                grants: string_list_claim(&claims, "grants")?,
            }
        } else {
            Grant::Scopes {
                scopes: string_list_claim(&claims, "scopes")?,
            }
        };
        build_token(&claims, grant)
    }

    fn verified_claims(&self, token: &str) -> Result<Map<String, Value>, AuthzError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.leeway_seconds;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if self.config.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(self.config.audience.as_slice());
        }
        let data = jsonwebtoken::decode::<Map<String, Value>>(token, &self.decoding_key, &validation)?;

        // jsonwebtoken still accepts a token in its `exp` second.
        let expires_at = data.claims.get("exp").and_then(Value::as_u64).unwrap_or_default();
        if expires_at.saturating_add(self.config.leeway_seconds) <= unix_now() {
            return Err(AuthzError::TokenExpired);
        }
        Ok(data.claims)
    }
}

/// Decode claims without verifying the signature or expiry. For
/// diagnostics only; never authorize from the result.
pub fn decode_token(token: &str) -> Result<Map<String, Value>, AuthzError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    let data = jsonwebtoken::decode::<Map<String, Value>>(
        token,
        &DecodingKey::from_secret(&[]),
        &validation,
    )
    .map_err(|err| AuthzError::TokenInvalid(err.to_string()))?;
    Ok(data.claims)
}

pub fn create_token(subject: &str, scopes: &[String], ttl: u64, secret: &str) -> Result<String, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.create_token(subject, scopes, Some(ttl))
}

pub fn create_token_with_grants(
    subject: &str,
    grants: &[String],
    ttl: u64,
    secret: &str,
) -> Result<String, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.create_token_with_grants(subject, grants, Some(ttl))
}

pub fn create_token_with_package_grant(
    subject: &str,
    quilt_uri: &str,
    mode: &str,
    ttl: u64,
    secret: &str,
) -> Result<String, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.create_token_with_package_grant(
        subject,
        quilt_uri,
        mode,
        Some(ttl),
    )
}

pub fn create_token_with_package_map(
    subject: &str,
    quilt_uri: &str,
    mode: &str,
    logical_bucket: &str,
    logical_key: &str,
    ttl: u64,
    secret: &str,
) -> Result<String, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.create_token_with_package_map(
        subject,
        quilt_uri,
        mode,
        logical_bucket,
        logical_key,
        Some(ttl),
    )
}

pub fn validate_token(token: &str, secret: &str) -> Result<Token, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.validate_token(token)
}

pub fn validate_package_token(token: &str, secret: &str) -> Result<Token, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.validate_package_token(token)
}

pub fn validate_package_map_token(token: &str, secret: &str) -> Result<Token, AuthzError> {
    TokenService::new(TokenConfig::new(secret))?.validate_package_map_token(token)
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

fn insert_grant_claims(claims: &mut Map<String, Value>, grant: &Grant) {
    match grant {
        Grant::Scopes { scopes } => {
            claims.insert("scopes".into(), Value::from(scopes.clone()));
        }
        Grant::Grants { grants } => {
            claims.insert("grants".into(), Value::from(grants.clone()));
        }
        Grant::Package { quilt_uri, mode } => {
            claims.insert("quilt_uri".into(), Value::from(quilt_uri.as_str()));
            claims.insert("mode".into(), Value::from(mode.to_string()));
        }
        Grant::Translation {
            quilt_uri,
            mode,
            logical_bucket,
            logical_key,
        } => {
            claims.insert("quilt_uri".into(), Value::from(quilt_uri.as_str()));
            claims.insert("mode".into(), Value::from(mode.to_string()));
            claims.insert("logical_bucket".into(), Value::from(logical_bucket.as_str()));
            claims.insert("logical_key".into(), Value::from(logical_key.as_str()));
            claims.insert(
                "logical_s3_path".into(),
                Value::from(format!("s3://{logical_bucket}/{logical_key}")),
            );
        }
    }
}

fn invalid(msg: impl Into<String>) -> AuthzError {
    AuthzError::TokenInvalid(msg.into())
}

/// An optional string claim; `null` counts as absent.
fn optional_str<'a>(claims: &'a Map<String, Value>, name: &str) -> Result<Option<&'a str>, AuthzError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(invalid(format!("{name} claim must be a string"))),
    }
}

fn required_str<'a>(claims: &'a Map<String, Value>, name: &str) -> Result<&'a str, AuthzError> {
    optional_str(claims, name)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| invalid(format!("missing {name} claim")))
}

/// A list-of-strings claim. Missing means empty; `null` or any other
/// shape is invalid.
fn string_list_claim(claims: &Map<String, Value>, name: &str) -> Result<Vec<String>, AuthzError> {
    match claims.get(name) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(format!("{name} claim must contain only strings")))
            })
            .collect(),
        Some(_) => Err(invalid(format!("{name} claim must be a list"))),
    }
}

const LOGICAL_CLAIMS: [&str; 3] = ["logical_bucket", "logical_key", "logical_s3_path"];

fn has_logical_claims(claims: &Map<String, Value>) -> bool {
    LOGICAL_CLAIMS
        .iter()
        .any(|name| claims.get(*name).is_some_and(|value| !value.is_null()))
}

/// A package grant covers the whole package, so a token bound to one
/// logical path never qualifies.
fn package_grant(claims: &Map<String, Value>) -> Result<Grant, AuthzError> {
    if has_logical_claims(claims) {
        return Err(invalid("package grant must not carry logical path claims"));
    }
    let (quilt_uri, mode) = package_claims(claims)?;
    Ok(Grant::Package { quilt_uri, mode })
}

fn package_claims(claims: &Map<String, Value>) -> Result<(String, TokenMode), AuthzError> {
    let quilt_uri = validate_quilt_uri(required_str(claims, "quilt_uri")?)
        .map_err(|err| invalid(format!("invalid quilt_uri claim: {err}")))?;
    let mode = TokenMode::parse_claim(required_str(claims, "mode")?)?;
    Ok((quilt_uri, mode))
}

fn translation_grant(claims: &Map<String, Value>) -> Result<Grant, AuthzError> {
    let (quilt_uri, mode) = package_claims(claims)?;
    let bucket = optional_str(claims, "logical_bucket")?;
    let key = optional_str(claims, "logical_key")?;

    let (logical_bucket, logical_key) = match optional_str(claims, "logical_s3_path")? {
        Some(path) => {
            let (path_bucket, path_key) = parse_s3_path(path)
                .map_err(|err| invalid(format!("invalid logical_s3_path claim: {err}")))?;
            if bucket.is_some_and(|b| b != path_bucket) || key.is_some_and(|k| k != path_key) {
                return Err(invalid("conflicting logical path claims"));
            }
            (path_bucket, path_key)
        }
        None => match (bucket, key) {
            (Some(b), Some(k)) if !b.is_empty() && !k.is_empty() => (b.to_string(), k.to_string()),
            _ => return Err(invalid("missing logical path claims")),
        },
    };

    Ok(Grant::Translation {
        quilt_uri,
        mode,
        logical_bucket,
        logical_key,
    })
}

fn build_token(claims: &Map<String, Value>, grant: Grant) -> Result<Token, AuthzError> {
    let subject = required_str(claims, "sub")?.to_string();
    let timestamp = |name: &str| -> Result<u64, AuthzError> {
        match claims.get(name) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| invalid(format!("{name} claim must be a unix timestamp"))),
        }
    };
    let audience = match claims.get("aud") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(aud)) => vec![aud.clone()],
        Some(Value::Array(_)) => string_list_claim(claims, "aud")?,
        Some(_) => return Err(invalid("aud claim must be a string or list")),
    };

    Ok(Token {
        subject,
        grant,
        issued_at: timestamp("iat")?,
        expires_at: timestamp("exp")?,
        issuer: optional_str(claims, "iss")?.map(str::to_string),
        audience,
    })
}
