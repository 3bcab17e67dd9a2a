//! Allow/deny decisions for scope tokens, package grants and translation
//! grants.
//!
//! Every entry point returns a [`Decision`]. Token failures, malformed
//! requests and collaborator errors all end in a deny.

use tracing::{debug, info, warn};

use crate::cedar::S3_OBJECT;
use crate::error::AuthzError;
use crate::grants::matching_grant;
use crate::scope::parse_scope;
use crate::token::{Grant, TokenConfig, TokenMode, TokenService};
use crate::traits::{ManifestResolver, MembershipChecker};
use crate::types::{AuthRequest, Decision, PackageAccessRequest, PackageMap, Scope};

const REASON_SCOPE_MATCHED: &str = "scope matched";
const REASON_SCOPE_NOT_GRANTED: &str = "scope not granted";
const REASON_INVALID_REQUEST: &str = "invalid request";
const REASON_MEMBER: &str = "object is member of package";
const REASON_NOT_MEMBER: &str = "object not in package";
const REASON_MODE: &str = "action not permitted by token mode";
const REASON_WRONG_LOGICAL_PATH: &str = "logical request not permitted by token";
const REASON_UNMAPPED: &str = "logical key not mapped in package";
const REASON_TRANSLATED: &str = "logical object translated";
const REASON_MEMBERSHIP_FAILED: &str = "membership check failed";
const REASON_MANIFEST_FAILED: &str = "manifest resolution failed";
const REASON_INVALID_TOKEN: &str = "invalid token";
const REASON_GRANT_MISMATCH: &str = "token grant not supported by this enforcement path";

const MULTIPART_ACTIONS: [&str; 4] = [
    "InitiateMultipartUpload",
    "UploadPart",
    "CompleteMultipartUpload",
    "AbortMultipartUpload",
];

const READ_ACTIONS: [&str; 8] = [
    "GetObject",
    "HeadObject",
    "GetObjectAttributes",
    "GetObjectTagging",
    "GetObjectVersion",
    "ListBucket",
    "ListObjectsV2",
    "ListBucketVersions",
];

/// Split `s3:GetObject` into its service prefix and bare action name.
fn split_service(action: &str) -> (Option<&str>, &str) {
    match action.split_once(':') {
        Some((service, name)) => (Some(service), name),
        None => (None, action),
    }
}

/// Whether a granted action covers the requested one. `GetObject` implies
/// `HeadObject`; `PutObject` implies the multipart upload actions. A service
/// prefix must be identical on both sides.
pub fn action_matches(granted: &str, requested: &str) -> bool {
    if granted == requested {
        return true;
    }
    let (granted_service, granted_name) = split_service(granted);
    let (requested_service, requested_name) = split_service(requested);
    if granted_service != requested_service {
        return false;
    }
    match granted_name {
        "GetObject" => requested_name == "HeadObject",
        "PutObject" => MULTIPART_ACTIONS.contains(&requested_name),
        _ => false,
    }
}

/// Read-class actions, with or without the `s3:` prefix.
pub fn is_read_action(action: &str) -> bool {
    READ_ACTIONS.contains(&split_service(action).1)
}

fn mode_permits(mode: TokenMode, action: &str) -> bool {
    match mode {
        TokenMode::Read => is_read_action(action),
    }
}

/// Equal, or `granted` ends in `/` or `-` and is a literal prefix of
/// `requested`.
pub fn matches_component(granted: &str, requested: &str) -> bool {
    granted == requested
        || ((granted.ends_with('/') || granted.ends_with('-')) && requested.starts_with(granted))
}

fn scope_prefix_match(granted: &Scope, requested: &Scope) -> bool {
    if granted.resource_type() != requested.resource_type()
        || !action_matches(granted.action(), requested.action())
    {
        return false;
    }
    if granted.resource_type() != S3_OBJECT {
        return matches_component(granted.resource_id(), requested.resource_id());
    }
    match (
        granted.resource_id().split_once('/'),
        requested.resource_id().split_once('/'),
    ) {
        (Some((granted_bucket, granted_key)), Some((requested_bucket, requested_key))) => {
            matches_component(granted_bucket, requested_bucket)
                && matches_component(granted_key, requested_key)
        }
        _ => false,
    }
}

/// S3-aware prefix match between two scope strings.
pub fn is_prefix_match(granted: &str, requested: &str) -> Result<bool, AuthzError> {
    Ok(scope_prefix_match(
        &parse_scope(granted)?,
        &parse_scope(requested)?,
    ))
}

fn parse_granted<S: AsRef<str>>(granted: &[S]) -> Result<Vec<Scope>, AuthzError> {
    granted
        .iter()
        .map(|raw| {
            let raw = raw.as_ref();
            parse_scope(raw).map_err(|err| {
                AuthzError::ScopeValidation(format!("malformed granted scope '{raw}': {err}"))
            })
        })
        .collect()
}

/// Whether any granted scope prefix-matches the request. One malformed
/// granted scope fails the whole check.
pub fn check_scopes<S: AsRef<str>>(request: &AuthRequest, granted: &[S]) -> Result<bool, AuthzError> {
    let requested = request.scope()?;
    let granted = parse_granted(granted)?;
    Ok(granted.iter().any(|g| scope_prefix_match(g, &requested)))
}

/// Token failures keep their own message; anything else surfacing while
/// validating collapses to a generic reason.
fn token_denied(err: AuthzError) -> Decision {
    warn!(event = "Enforce", phase = "Token", error = %err);
    if err.is_token_error() {
        Decision::deny(err.to_string())
    } else {
        Decision::deny(REASON_INVALID_TOKEN)
    }
}

fn request_is_blank(request: &PackageAccessRequest) -> bool {
    [&request.bucket, &request.key, &request.action]
        .iter()
        .any(|field| field.trim().is_empty())
}

/// Makes decisions with the tokens of one [`TokenService`].
#[derive(Debug, Clone)]
pub struct Enforcer {
    tokens: TokenService,
}

impl Enforcer {
    pub fn new(tokens: TokenService) -> Self {
        Enforcer { tokens }
    }

    pub fn from_config(config: TokenConfig) -> Result<Self, AuthzError> {
        Ok(Enforcer::new(TokenService::new(config)?))
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Check a scope token against a request.
    pub fn enforce(&self, token: &str, request: &AuthRequest) -> Decision {
        debug!(
            event = "Enforce",
            phase = "Scopes",
            resource_type = request.resource_type.as_str(),
            resource_id = request.resource_id.as_str(),
            action = request.action.as_str(),
        );
        match self.tokens.validate_token(token) {
            Ok(validated) => decide_scopes(validated.scopes(), request),
            Err(err) => token_denied(err),
        }
    }

    /// Check a package-grant token: the object must belong to the package.
    pub fn enforce_package_grant<M>(
        &self,
        token: &str,
        request: &PackageAccessRequest,
        membership: &M,
    ) -> Decision
    where
        M: MembershipChecker + ?Sized,
    {
        match self.tokens.validate_package_token(token) {
            Ok(validated) => {
                decide_grant(&validated.grant, request, Some(membership), None::<&NoResolver>)
            }
            Err(err) => token_denied(err),
        }
    }

    /// Check a translation-grant token and resolve the logical object to its
    /// physical targets.
    pub fn enforce_translation_grant<R>(
        &self,
        token: &str,
        request: &PackageAccessRequest,
        resolver: &R,
    ) -> Decision
    where
        R: ManifestResolver + ?Sized,
    {
        match self.tokens.validate_package_map_token(token) {
            Ok(validated) => {
                decide_grant(&validated.grant, request, None::<&NoMembership>, Some(resolver))
            }
            Err(err) => token_denied(err),
        }
    }

    /// Validate a token of any kind once and dispatch on its grant. Scope
    /// tokens check `S3Object:{bucket}/{key}:{action}`; proxy grants check
    /// the request string `{action}/{bucket}/{key}`.
    pub fn enforce_with_routing<M, R>(
        &self,
        token: &str,
        request: &PackageAccessRequest,
        membership: &M,
        resolver: &R,
    ) -> Decision
    where
        M: MembershipChecker + ?Sized,
        R: ManifestResolver + ?Sized,
    {
        let validated = match self.tokens.validate(token) {
            Ok(validated) => validated,
            Err(err) => return token_denied(err),
        };
        debug!(event = "Enforce", phase = "Route", grant = validated.grant.kind());
        decide_grant(&validated.grant, request, Some(membership), Some(resolver))
    }
}

/// Placeholder collaborators for paths that never consult them.
struct NoMembership;
struct NoResolver;

impl MembershipChecker for NoMembership {
    fn is_member(&self, _: &str, _: &str, _: &str) -> Result<bool, AuthzError> {
        Err(AuthzError::Collaborator("no membership checker configured".into()))
    }
}

impl ManifestResolver for NoResolver {
    fn resolve(&self, _: &str) -> Result<PackageMap, AuthzError> {
        Err(AuthzError::Collaborator("no manifest resolver configured".into()))
    }
}

fn decide_scopes<S: AsRef<str>>(granted: &[S], request: &AuthRequest) -> Decision {
    match check_scopes(request, granted) {
        Ok(true) => {
            let scope = request.scope().map(|s| s.to_string()).unwrap_or_default();
            info!(event = "Enforce", phase = "Allow", scope = scope.as_str());
            Decision::allow(REASON_SCOPE_MATCHED, scope)
        }
        Ok(false) => {
            debug!(event = "Enforce", phase = "Deny", reason = REASON_SCOPE_NOT_GRANTED);
            Decision::deny(REASON_SCOPE_NOT_GRANTED)
        }
        Err(err) => {
            warn!(event = "Enforce", phase = "Scopes", error = %err);
            Decision::deny(REASON_INVALID_REQUEST)
        }
    }
}

fn decide_grant<M, R>(
    grant: &Grant,
    request: &PackageAccessRequest,
    membership: Option<&M>,
    resolver: Option<&R>,
) -> Decision
where
    M: MembershipChecker + ?Sized,
    R: ManifestResolver + ?Sized,
{
    if request_is_blank(request) {
        warn!(event = "Enforce", phase = "Request", "blank bucket, key or action");
        return Decision::deny(REASON_INVALID_REQUEST);
    }
    match (grant, membership, resolver) {
        (Grant::Scopes { scopes }, _, _) => {
            match AuthRequest::new(
                S3_OBJECT,
                format!("{}/{}", request.bucket, request.key),
                request.action.as_str(),
            ) {
                Ok(scoped) => decide_scopes(scopes.as_slice(), &scoped),
                Err(err) => {
                    warn!(event = "Enforce", phase = "Request", error = %err);
                    Decision::deny(REASON_INVALID_REQUEST)
                }
            }
        }
        (Grant::Grants { grants }, _, _) => {
            let request_string = format!("{}/{}/{}", request.action, request.bucket, request.key);
            match matching_grant(&request_string, grants.as_slice()) {
                Some(grant) => {
                    info!(event = "Enforce", phase = "Allow", grant);
                    Decision::allow(REASON_SCOPE_MATCHED, grant)
                }
                None => {
                    debug!(event = "Enforce", phase = "Deny", request = request_string.as_str());
                    Decision::deny(REASON_SCOPE_NOT_GRANTED)
                }
            }
        }
        (Grant::Package { quilt_uri, mode }, Some(membership), _) => {
            decide_package(quilt_uri, *mode, request, membership)
        }
        (
            Grant::Translation {
                quilt_uri,
                mode,
                logical_bucket,
                logical_key,
            },
            _,
            Some(resolver),
        ) => decide_translation(
            quilt_uri,
            *mode,
            (logical_bucket.as_str(), logical_key.as_str()),
            request,
            resolver,
        ),
        (grant, _, _) => {
            warn!(event = "Enforce", phase = "Route", grant = grant.kind(), "no collaborator for grant");
            Decision::deny(REASON_GRANT_MISMATCH)
        }
    }
}

fn decide_package<M: MembershipChecker + ?Sized>(
    quilt_uri: &str,
    mode: TokenMode,
    request: &PackageAccessRequest,
    membership: &M,
) -> Decision {
    if !mode_permits(mode, &request.action) {
        debug!(event = "Enforce", phase = "Mode", mode = %mode, action = request.action.as_str());
        return Decision::deny(REASON_MODE);
    }
    match membership.is_member(quilt_uri, &request.bucket, &request.key) {
        Ok(true) => {
            info!(event = "Enforce", phase = "Allow", quilt_uri, bucket = request.bucket.as_str(), key = request.key.as_str());
            Decision::allow(REASON_MEMBER, quilt_uri)
        }
        Ok(false) => {
            debug!(event = "Enforce", phase = "Deny", reason = REASON_NOT_MEMBER);
            Decision::deny(REASON_NOT_MEMBER)
        }
        Err(err) => {
            warn!(event = "Enforce", phase = "Membership", quilt_uri, error = %err);
            Decision::deny(REASON_MEMBERSHIP_FAILED)
        }
    }
}

fn decide_translation<R: ManifestResolver + ?Sized>(
    quilt_uri: &str,
    mode: TokenMode,
    (logical_bucket, logical_key): (&str, &str),
    request: &PackageAccessRequest,
    resolver: &R,
) -> Decision {
    if request.bucket != logical_bucket || request.key != logical_key {
        debug!(
            event = "Enforce",
            phase = "Deny",
            reason = REASON_WRONG_LOGICAL_PATH,
            bucket = request.bucket.as_str(),
            key = request.key.as_str(),
        );
        return Decision::deny(REASON_WRONG_LOGICAL_PATH);
    }
    if !mode_permits(mode, &request.action) {
        debug!(event = "Enforce", phase = "Mode", mode = %mode, action = request.action.as_str());
        return Decision::deny(REASON_MODE);
    }
    let manifest = match resolver.resolve(quilt_uri) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(event = "Enforce", phase = "Manifest", quilt_uri, error = %err);
            return Decision::deny(REASON_MANIFEST_FAILED);
        }
    };
    match manifest.translate(logical_key) {
        Ok([]) => {
            debug!(event = "Enforce", phase = "Deny", reason = REASON_UNMAPPED, logical_key);
            Decision::deny(REASON_UNMAPPED)
        }
        Ok(targets) => {
            info!(event = "Enforce", phase = "Allow", quilt_uri, logical_key, targets = targets.len());
            Decision::translated(REASON_TRANSLATED, quilt_uri, targets.to_vec())
        }
        Err(err) => {
            warn!(event = "Enforce", phase = "Manifest", error = %err);
            Decision::deny(REASON_INVALID_REQUEST)
        }
    }
}

fn with_secret(secret: &str, decide: impl FnOnce(&Enforcer) -> Decision) -> Decision {
    match Enforcer::from_config(TokenConfig::new(secret)) {
        Ok(enforcer) => decide(&enforcer),
        Err(err) => token_denied(err),
    }
}

pub fn enforce(token: &str, request: &AuthRequest, secret: &str) -> Decision {
    with_secret(secret, |enforcer| enforcer.enforce(token, request))
}

pub fn enforce_package_grant<M: MembershipChecker + ?Sized>(
    token: &str,
    request: &PackageAccessRequest,
    secret: &str,
    membership: &M,
) -> Decision {
    with_secret(secret, |enforcer| {
        enforcer.enforce_package_grant(token, request, membership)
    })
}

pub fn enforce_translation_grant<R: ManifestResolver + ?Sized>(
    token: &str,
    request: &PackageAccessRequest,
    secret: &str,
    resolver: &R,
) -> Decision {
    with_secret(secret, |enforcer| {
        enforcer.enforce_translation_grant(token, request, resolver)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::unix_now;
    use crate::types::S3Location;
    use insta::assert_json_snapshot;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::Value;
    use yare::parameterized;

    const SECRET: &str = "enforcer-secret";
    const URI: &str = "quilt+s3://registry#package=team/data@abc123";

    fn enforcer() -> Enforcer {
        Enforcer::from_config(TokenConfig::new(SECRET)).unwrap()
    }

    fn scope_token(scopes: &[&str]) -> String {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        enforcer().tokens().create_token("alice", &scopes, None).unwrap()
    }

    fn member_of(bucket: &'static str) -> impl Fn(&str, &str, &str) -> Result<bool, AuthzError> {
        move |_: &str, b: &str, _: &str| Ok(b == bucket)
    }

    fn manifest(_uri: &str) -> Result<PackageMap, AuthzError> {
        Ok(PackageMap::from_iter([
            ("data/file.csv".to_string(), S3Location::new("physical-east", "v1/file.csv")),
            ("data/file.csv".to_string(), S3Location::new("physical-west", "v1/file.csv")),
        ]))
    }

    fn s3_get(bucket: &str, key: &str) -> PackageAccessRequest {
        PackageAccessRequest::new(bucket, key, "s3:GetObject")
    }

    #[parameterized(
        exact = { "s3:GetObject", "s3:GetObject", true },
        get_implies_head = { "s3:GetObject", "s3:HeadObject", true },
        bare_get_implies_head = { "GetObject", "HeadObject", true },
        put_implies_upload_part = { "s3:PutObject", "s3:UploadPart", true },
        put_implies_initiate = { "s3:PutObject", "s3:InitiateMultipartUpload", true },
        put_implies_complete = { "s3:PutObject", "s3:CompleteMultipartUpload", true },
        put_implies_abort = { "s3:PutObject", "s3:AbortMultipartUpload", true },
        head_does_not_imply_get = { "s3:HeadObject", "s3:GetObject", false },
        get_does_not_imply_put = { "s3:GetObject", "s3:PutObject", false },
        prefix_mismatch = { "s3:GetObject", "HeadObject", false },
        other_service = { "s4:GetObject", "s3:HeadObject", false },
    )]
    fn test_action_matches(granted: &str, requested: &str, expected: bool) {
        assert_eq!(action_matches(granted, requested), expected);
    }

    #[parameterized(
        exact = { "S3Object:bucket/key.txt:s3:GetObject", "S3Object:bucket/key.txt:s3:GetObject", true },
        key_prefix = { "S3Object:bucket/prefix/:s3:GetObject", "S3Object:bucket/prefix/file.txt:s3:GetObject", true },
        nested_prefix = { "S3Object:bucket/a/:s3:GetObject", "S3Object:bucket/a/b/c.txt:s3:GetObject", true },
        sibling_prefix = { "S3Object:bucket/prefix/:s3:GetObject", "S3Object:bucket/prefix-other/file.txt:s3:GetObject", false },
        dash_bucket_boundary = { "S3Object:bucket-/:s3:GetObject", "S3Object:bucket-other/key:s3:GetObject", false },
        dash_key_prefix = { "S3Object:bucket/report-:s3:GetObject", "S3Object:bucket/report-2024.csv:s3:GetObject", true },
        no_delimiter_prefix = { "S3Object:bucket/rep:s3:GetObject", "S3Object:bucket/report.csv:s3:GetObject", false },
        head_via_get = { "S3Object:bucket/key:s3:GetObject", "S3Object:bucket/key:s3:HeadObject", true },
        type_mismatch = { "S3Bucket:bucket:s3:GetObject", "S3Object:bucket/key:s3:GetObject", false },
        bucket_exact = { "S3Bucket:bucket:s3:ListBucket", "S3Bucket:bucket:s3:ListBucket", true },
        bucket_dash_prefix = { "S3Bucket:team-:s3:ListBucket", "S3Bucket:team-data:s3:ListBucket", true },
        object_without_slash = { "S3Object:bucket:s3:GetObject", "S3Object:bucket:s3:GetObject", false },
        object_requested_without_slash = { "S3Object:bucket/:s3:GetObject", "S3Object:bucket:s3:GetObject", false },
        generic = { "Document:doc1:read", "Document:doc1:read", true },
    )]
    fn test_is_prefix_match(granted: &str, requested: &str, expected: bool) {
        assert_eq!(is_prefix_match(granted, requested).unwrap(), expected);
    }

    #[test]
    fn test_is_prefix_match_rejects_malformed() {
        assert!(is_prefix_match("not-a-scope", "Document:doc1:read").is_err());
    }

    #[test]
    fn test_check_scopes_fails_on_any_malformed_grant() {
        let request = AuthRequest::new("Document", "doc1", "read").unwrap();
        let err = check_scopes(&request, &["Document:doc1:read", "broken"]).unwrap_err();
        assert!(matches!(err, AuthzError::ScopeValidation(_)));
    }

    #[test]
    fn test_enforce_allows_matching_scope() {
        let token = scope_token(&["Document:doc1:read"]);
        let request = AuthRequest::new("Document", "doc1", "read").unwrap();
        assert_json_snapshot!(enforce(&token, &request, SECRET), @r#"
        {
          "allowed": true,
          "reason": "scope matched",
          "matched_scope": "Document:doc1:read"
        }
        "#);
    }

    #[test]
    fn test_enforce_denies_unmatched_scope() {
        let token = scope_token(&["Document:doc1:read"]);
        let request = AuthRequest::new("Document", "doc2", "read").unwrap();
        assert_eq!(enforce(&token, &request, SECRET), Decision::deny("scope not granted"));
    }

    #[test]
    fn test_enforce_empty_scopes_denies() {
        let token = scope_token(&[]);
        let request = AuthRequest::new("Document", "doc1", "read").unwrap();
        assert!(!enforce(&token, &request, SECRET).allowed);
    }

    #[test]
    fn test_enforce_malformed_granted_scope_is_invalid_request() {
        let token = scope_token(&["broken"]);
        let request = AuthRequest::new("Document", "doc1", "read").unwrap();
        assert_eq!(enforce(&token, &request, SECRET), Decision::deny("invalid request"));
    }

    #[parameterized(
        garbage = { "garbage" },
        empty = { "" },
    )]
    fn test_enforce_invalid_token_denies(token: &str) {
        let request = AuthRequest::new("Document", "doc1", "read").unwrap();
        let decision = enforce(token, &request, SECRET);
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("invalid token"));
    }

    #[test]
    fn test_enforce_wrong_secret_denies() {
        let token = scope_token(&["Document:doc1:read"]);
        let request = AuthRequest::new("Document", "doc1", "read").unwrap();
        assert!(!enforce(&token, &request, "other-secret").allowed);
    }

    #[test]
    fn test_enforce_is_deterministic() {
        let token = scope_token(&["S3Object:bucket/prefix/:s3:GetObject"]);
        let request = AuthRequest::new("S3Object", "bucket/prefix/a.csv", "s3:GetObject").unwrap();
        let first = enforce(&token, &request, SECRET);
        for _ in 0..5 {
            assert_eq!(enforce(&token, &request, SECRET), first);
        }
        assert!(first.allowed);
    }

    fn package_token() -> String {
        enforcer()
            .tokens()
            .create_token_with_package_grant("alice", URI, "read", None)
            .unwrap()
    }

    #[test]
    fn test_package_grant_member() {
        let decision =
            enforce_package_grant(&package_token(), &s3_get("pkg", "k"), SECRET, &member_of("pkg"));
        assert_eq!(decision, Decision::allow("object is member of package", URI));
    }

    #[test]
    fn test_package_grant_not_member() {
        let decision =
            enforce_package_grant(&package_token(), &s3_get("other", "k"), SECRET, &member_of("pkg"));
        assert_eq!(decision, Decision::deny("object not in package"));
    }

    #[parameterized(
        put = { "s3:PutObject" },
        delete = { "DeleteObject" },
        upload_part = { "s3:UploadPart" },
    )]
    fn test_package_grant_write_denied(action: &str) {
        let request = PackageAccessRequest::new("pkg", "k", action);
        let decision = enforce_package_grant(&package_token(), &request, SECRET, &member_of("pkg"));
        assert_eq!(decision, Decision::deny("action not permitted by token mode"));
    }

    #[test]
    fn test_package_grant_checker_error() {
        let failing = |_: &str, _: &str, _: &str| -> Result<bool, AuthzError> {
            Err(AuthzError::Collaborator("timeout".into()))
        };
        let decision = enforce_package_grant(&package_token(), &s3_get("pkg", "k"), SECRET, &failing);
        assert_eq!(decision, Decision::deny("membership check failed"));
    }

    fn expired_token(mut claims: Value) -> String {
        let past = unix_now() - 120;
        if let Some(target) = claims.as_object_mut() {
            target.insert("sub".into(), Value::from("alice"));
            target.insert("iat".into(), Value::from(past - 600));
            target.insert("exp".into(), Value::from(past));
        }
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[parameterized(
        scopes = { serde_json::json!({"scopes": ["S3Object:pkg/k:s3:GetObject"]}), EnforcePath::Scopes },
        package = { serde_json::json!({"quilt_uri": URI, "mode": "read"}), EnforcePath::Package },
        translation = {
            serde_json::json!({"quilt_uri": URI, "mode": "read", "logical_bucket": "pkg", "logical_key": "k"}),
            EnforcePath::Translation
        },
        routed = { serde_json::json!({"quilt_uri": URI, "mode": "read"}), EnforcePath::Routed },
    )]
    fn test_expired_token_denied_on_every_path(claims: Value, path: EnforcePath) {
        let token = expired_token(claims);
        let request = s3_get("pkg", "k");
        let scoped = AuthRequest::new("S3Object", "pkg/k", "s3:GetObject").unwrap();
        let always = |_: &str, _: &str, _: &str| -> Result<bool, AuthzError> { Ok(true) };
        let decision = match path {
            EnforcePath::Scopes => enforce(&token, &scoped, SECRET),
            EnforcePath::Package => enforce_package_grant(&token, &request, SECRET, &always),
            EnforcePath::Translation => enforce_translation_grant(&token, &request, SECRET, &manifest),
            EnforcePath::Routed => enforcer().enforce_with_routing(&token, &request, &always, &manifest),
        };
        assert_eq!(decision, Decision::deny("token expired"));
    }

    #[derive(Debug, Clone, Copy)]
    enum EnforcePath {
        Scopes,
        Package,
        Translation,
        Routed,
    }

    #[test]
    fn test_package_grant_rejects_translation_token() {
        let always = |_: &str, _: &str, _: &str| -> Result<bool, AuthzError> { Ok(true) };
        let token = enforcer()
            .tokens()
            .create_token_with_package_map("alice", URI, "read", "logical", "data/one.csv", None)
            .unwrap();
        let decision = enforce_package_grant(
            &token,
            &s3_get("physical", "secret/other-file.csv"),
            SECRET,
            &always,
        );
        assert_eq!(
            decision,
            Decision::deny("invalid token: package grant must not carry logical path claims")
        );
    }

    #[test]
    fn test_translation_grant_rejects_package_token() {
        let decision = enforce_translation_grant(
            &package_token(),
            &s3_get("logical", "data/file.csv"),
            SECRET,
            &manifest,
        );
        assert_eq!(decision, Decision::deny("invalid token: missing logical path claims"));
    }

    #[test]
    fn test_enforce_ignores_proxy_grants() {
        let token = enforcer()
            .tokens()
            .create_token_with_grants("alice", &["s3:GetObject/pkg/".to_string()], None)
            .unwrap();
        let request = AuthRequest::new("S3Object", "pkg/k", "s3:GetObject").unwrap();
        assert_eq!(enforce(&token, &request, SECRET), Decision::deny("scope not granted"));
    }

    #[test]
    fn test_non_token_errors_use_generic_reason() {
        assert_eq!(
            token_denied(AuthzError::Collaborator("secret store unavailable".into())),
            Decision::deny("invalid token")
        );
        assert_eq!(token_denied(AuthzError::TokenExpired), Decision::deny("token expired"));
    }

    #[test]
    fn test_package_grant_rejects_scope_token() {
        let decision = enforce_package_grant(
            &scope_token(&["Document:doc1:read"]),
            &s3_get("pkg", "k"),
            SECRET,
            &member_of("pkg"),
        );
        assert!(!decision.allowed);
        assert!(decision.reason.starts_with("invalid token"));
    }

    fn translation_token() -> String {
        enforcer()
            .tokens()
            .create_token_with_package_map("alice", URI, "read", "logical", "data/file.csv", None)
            .unwrap()
    }

    #[test]
    fn test_translation_grant_targets() {
        let decision = enforce_translation_grant(
            &translation_token(),
            &s3_get("logical", "data/file.csv"),
            SECRET,
            &manifest,
        );
        assert_json_snapshot!(decision, @r#"
        {
          "allowed": true,
          "reason": "logical object translated",
          "matched_scope": "quilt+s3://registry#package=team/data@abc123",
          "translated_targets": [
            {
              "bucket": "physical-east",
              "key": "v1/file.csv"
            },
            {
              "bucket": "physical-west",
              "key": "v1/file.csv"
            }
          ]
        }
        "#);
    }

    #[test]
    fn test_translation_grant_wrong_path() {
        let decision = enforce_translation_grant(
            &translation_token(),
            &s3_get("logical", "data/other.csv"),
            SECRET,
            &manifest,
        );
        assert_eq!(decision, Decision::deny("logical request not permitted by token"));
    }

    #[test]
    fn test_translation_grant_unmapped() {
        let token = enforcer()
            .tokens()
            .create_token_with_package_map("alice", URI, "read", "logical", "missing.csv", None)
            .unwrap();
        let decision =
            enforce_translation_grant(&token, &s3_get("logical", "missing.csv"), SECRET, &manifest);
        assert_eq!(decision, Decision::deny("logical key not mapped in package"));
    }

    #[test]
    fn test_translation_grant_write_denied() {
        let request = PackageAccessRequest::new("logical", "data/file.csv", "s3:PutObject");
        let decision = enforce_translation_grant(&translation_token(), &request, SECRET, &manifest);
        assert_eq!(decision, Decision::deny("action not permitted by token mode"));
    }

    #[test]
    fn test_translation_grant_resolver_error() {
        let failing = |_: &str| -> Result<PackageMap, AuthzError> {
            Err(AuthzError::Collaborator("registry down".into()))
        };
        let decision = enforce_translation_grant(
            &translation_token(),
            &s3_get("logical", "data/file.csv"),
            SECRET,
            &failing,
        );
        assert_eq!(decision, Decision::deny("manifest resolution failed"));
    }

    #[test]
    fn test_blank_request_is_invalid() {
        let decision = enforce_package_grant(&package_token(), &s3_get("pkg", " "), SECRET, &member_of("pkg"));
        assert_eq!(decision, Decision::deny("invalid request"));
    }

    #[test]
    fn test_routing_dispatches_by_grant() {
        let enforcer = enforcer();
        let membership = member_of("pkg");
        let route = |token: &str, request: &PackageAccessRequest| {
            enforcer.enforce_with_routing(token, request, &membership, &manifest)
        };

        let scoped = scope_token(&["S3Object:pkg/data/:s3:GetObject"]);
        assert!(route(&scoped, &s3_get("pkg", "data/a.csv")).allowed);
        assert!(!route(&scoped, &s3_get("pkg", "other/a.csv")).allowed);

        let grants = enforcer
            .tokens()
            .create_token_with_grants("alice", &["s3:GetObject/pkg/data/".to_string()], None)
            .unwrap();
        assert_eq!(
            route(&grants, &s3_get("pkg", "data/a.csv")),
            Decision::allow("scope matched", "s3:GetObject/pkg/data/")
        );

        assert_eq!(
            route(&package_token(), &s3_get("pkg", "k")).reason,
            "object is member of package"
        );
        assert_eq!(
            route(&translation_token(), &s3_get("logical", "data/file.csv")).reason,
            "logical object translated"
        );
    }

    #[test]
    fn test_read_actions() {
        assert!(is_read_action("s3:ListObjectsV2"));
        assert!(is_read_action("GetObjectTagging"));
        assert!(!is_read_action("s3:PutObjectTagging"));
    }
}
