//! Scope string encoding and the generic (exact and wildcard) scope API.
//!
//! These helpers have no S3 semantics; the prefix- and hierarchy-aware
//! matcher used at enforcement time lives in [`crate::enforcer`].

use std::collections::HashSet;

use itertools::Itertools;
use tracing::warn;

use crate::error::AuthzError;
use crate::pattern::{Glob, GlobSyntax, glob_match};
use crate::types::{SCOPE_DELIMITER, Scope};

/// Parse `ResourceType:ResourceId:Action`.
pub fn parse_scope(s: &str) -> Result<Scope, AuthzError> {
    s.parse()
}

/// Canonical scope string. Inverse of [`parse_scope`].
pub fn format_scope(resource_type: &str, resource_id: &str, action: &str) -> String {
    format!("{resource_type}{SCOPE_DELIMITER}{resource_id}{SCOPE_DELIMITER}{action}")
}

/// Exact containment: `requested` is one of `granted`.
///
/// Every granted entry is parsed, so one malformed entry fails the whole
/// check.
pub fn is_subset<I, S>(requested: &Scope, granted: I) -> Result<bool, AuthzError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let granted: HashSet<Scope> = granted
        .into_iter()
        .map(|s| parse_scope(s.as_ref()))
        .collect::<Result<_, _>>()?;
    Ok(granted.contains(requested))
}

/// `*` matches any run of characters; everything else is literal.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    glob_match(value, pattern, GlobSyntax::Star)
}

/// Field-wise wildcard match of a requested scope against a granted pattern.
pub fn scope_matches(requested: &Scope, granted: &Scope) -> bool {
    ScopePattern::new(granted).matches(requested)
}

/// A granted scope with each field compiled as a `*` glob.
pub(crate) struct ScopePattern {
    resource_type: Glob,
    resource_id: Glob,
    action: Glob,
}

impl ScopePattern {
    pub(crate) fn new(scope: &Scope) -> Self {
        let (resource_type, resource_id, action) = scope.fields();
        ScopePattern {
            resource_type: Glob::new(resource_type, GlobSyntax::Star),
            resource_id: Glob::new(resource_id, GlobSyntax::Star),
            action: Glob::new(action, GlobSyntax::Star),
        }
    }

    pub(crate) fn matches(&self, requested: &Scope) -> bool {
        self.resource_type.matches(requested.resource_type())
            && self.resource_id.matches(requested.resource_id())
            && self.action.matches(requested.action())
    }
}

/// Expand wildcards in a scope against known resource types and actions.
///
/// A wildcard resource type needs `resource_types`; a wildcard action is
/// expanded when `actions` is supplied and kept verbatim otherwise. A
/// wildcard resource id is always kept for runtime matching.
pub fn expand_wildcard_scope(
    scope: &str,
    resource_types: Option<&[&str]>,
    actions: Option<&[&str]>,
) -> Result<Vec<String>, AuthzError> {
    let parsed = parse_scope(scope)?;
    let (resource_type, resource_id, action) = parsed.fields();

    let types: Vec<&str> = if resource_type.contains('*') {
        let known = resource_types.ok_or_else(|| {
            AuthzError::ScopeValidation(format!(
                "cannot expand resource type wildcard in '{scope}' without resource types"
            ))
        })?;
        let glob = Glob::new(resource_type, GlobSyntax::Star);
        known
            .iter()
            .copied()
            .filter(|candidate| glob.matches(candidate))
            .collect()
    } else {
        vec![resource_type]
    };

    let expanded_actions: Vec<&str> = match actions {
        Some(known) if action.contains('*') => {
            let glob = Glob::new(action, GlobSyntax::Star);
            known
                .iter()
                .copied()
                .filter(|candidate| glob.matches(candidate))
                .collect()
        }
        _ => vec![action],
    };

    Ok(types
        .iter()
        .cartesian_product(expanded_actions.iter())
        .map(|(rtype, act)| format_scope(rtype, resource_id, act))
        .unique()
        .collect())
}

/// Keep scopes that match any include pattern (all, when none are given)
/// and no exclude pattern. Order is preserved; malformed scopes are dropped.
pub fn filter_scopes_by_pattern<S: AsRef<str>>(
    scopes: &[S],
    include_patterns: Option<&[&str]>,
    exclude_patterns: Option<&[&str]>,
) -> Vec<String> {
    let compile = |patterns: Option<&[&str]>| -> Vec<ScopePattern> {
        patterns
            .unwrap_or_default()
            .iter()
            .filter_map(|p| match parse_scope(p) {
                Ok(scope) => Some(ScopePattern::new(&scope)),
                Err(err) => {
                    warn!(event = "ScopeFilter", phase = "Pattern", pattern = *p, error = %err);
                    None
                }
            })
            .collect()
    };
    let include = compile(include_patterns);
    let exclude = compile(exclude_patterns);

    scopes
        .iter()
        .filter_map(|s| {
            let raw: &str = s.as_ref();
            let Ok(scope) = parse_scope(raw) else {
                warn!(event = "ScopeFilter", phase = "Scope", scope = raw, "dropping malformed scope");
                return None;
            };
            let included =
                include_patterns.is_none() || include.iter().any(|p| p.matches(&scope));
            let excluded = exclude.iter().any(|p| p.matches(&scope));
            (included && !excluded).then(|| raw.to_string())
        })
        .collect()
}
