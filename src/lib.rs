// src/lib.rs
pub use compiler::{
    CompileOptions, CompiledScopes, ErrorMode, compile_document, compile_policies,
    compile_policy, compile_policy_store, instantiate_policy_template, render_policy_template,
};
pub use enforcer::{
    Enforcer, action_matches, check_scopes, enforce, enforce_package_grant,
    enforce_translation_grant, is_prefix_match, is_read_action, matches_component,
};
pub use error::AuthzError;
pub use grants::{
    construct_request_string, convert_scope_to_grant, convert_scopes_to_grants,
    extract_bearer_token, is_authorized, matching_grant,
};
pub use quilt_uri::{QuiltUri, normalize_quilt_uri, package_name_matches, validate_quilt_uri};
pub use scope::{
    expand_wildcard_scope, filter_scopes_by_pattern, format_scope, is_subset, matches_pattern,
    parse_scope, scope_matches,
};
pub use token::{
    Grant, Token, TokenConfig, TokenMode, TokenService, create_token, create_token_with_grants,
    create_token_with_package_grant, create_token_with_package_map, decode_token,
    validate_package_map_token, validate_package_token, validate_token,
};
pub use traits::{
    ManifestMembership, ManifestResolver, MembershipChecker, PolicyStore, SecretProvider,
};
pub use types::{
    AuthRequest, Decision, PackageAccessRequest, PackageMap, S3Location, Scope, parse_s3_path,
};

pub mod cedar;
mod compiler;
mod enforcer;
mod error;
mod grants;
mod pattern;
mod quilt_uri;
mod scope;
mod token;
mod traits;
pub mod types;
