//! Compile permit/forbid statements into per-principal scope lists.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::cedar::{CedarPolicy, Effect, S3_OBJECT, parse_policies, parse_policy};
use crate::error::AuthzError;
use crate::pattern::{Glob, GlobSyntax};
use crate::traits::PolicyStore;
use crate::types::Scope;

mod template;

pub use template::render_policy_template;
use template::{has_template_syntax, placeholders, unresolved};

/// Principal id to scope strings, in first-seen order.
pub type CompiledScopes = IndexMap<String, Vec<String>>;

/// What a batch compile does with a statement that fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorMode {
    /// Return the first error; nothing is compiled.
    #[default]
    Abort,
    /// Log the failing statement and leave it out.
    Skip,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub handle_forbids: bool,
    pub on_error: ErrorMode,
    /// Known action ids used to expand wildcard actions such as `s3:Get*`.
    pub action_catalog: Option<Vec<String>>,
}

impl CompileOptions {
    pub fn with_forbids(mut self) -> Self {
        self.handle_forbids = true;
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.on_error = mode;
        self
    }

    pub fn with_action_catalog<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_catalog = Some(actions.into_iter().map(Into::into).collect());
        self
    }
}

/// Compile one statement. A forbid compiles to an empty mapping.
pub fn compile_policy(statement: &str) -> Result<CompiledScopes, AuthzError> {
    let policy = parse_policy(statement)?;
    if policy.effect == Effect::Forbid {
        reject_unsupported_conditions(&policy)?;
        return Ok(CompiledScopes::new());
    }
    let mut acc = ScopeAccumulator::default();
    acc.add(&policy, &CompileOptions::default())?;
    Ok(acc.finish())
}

/// Compile a batch of statements, each holding exactly one policy.
///
/// Forbids are applied after every permit has been collected, so the
/// outcome does not depend on statement order.
pub fn compile_policies<S: AsRef<str>>(
    statements: &[S],
    options: &CompileOptions,
) -> Result<CompiledScopes, AuthzError> {
    let mut acc = ScopeAccumulator::default();
    for (index, statement) in statements.iter().enumerate() {
        let outcome = parse_policy(statement.as_ref()).and_then(|policy| acc.add(&policy, options));
        if let Err(err) = outcome {
            handle_failure(index, err, options)?;
        }
    }
    let compiled = acc.finish();
    info!(
        event = "Compile",
        phase = "Complete",
        statements = statements.len(),
        principals = compiled.len(),
    );
    Ok(compiled)
}

/// Compile a document of `;`-separated statements.
pub fn compile_document(text: &str, options: &CompileOptions) -> Result<CompiledScopes, AuthzError> {
    let mut acc = ScopeAccumulator::default();
    for (index, policy) in parse_policies(text)?.iter().enumerate() {
        if let Err(err) = acc.add(policy, options) {
            handle_failure(index, err, options)?;
        }
    }
    Ok(acc.finish())
}

/// Compile every document a policy store lists, merged into one mapping.
pub fn compile_policy_store<P: PolicyStore + ?Sized>(
    store: &P,
    options: &CompileOptions,
) -> Result<CompiledScopes, AuthzError> {
    let documents = store.list_and_fetch()?;
    let mut acc = ScopeAccumulator::default();
    for (policy_id, text) in &documents {
        let parsed = match parse_policies(text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(event = "Compile", phase = "Store", policy_id = policy_id.as_str(), error = %err);
                if options.on_error == ErrorMode::Abort {
                    return Err(err);
                }
                continue;
            }
        };
        for policy in &parsed {
            if let Err(err) = acc.add(policy, options) {
                warn!(event = "Compile", phase = "Store", policy_id = policy_id.as_str(), error = %err);
                if options.on_error == ErrorMode::Abort {
                    return Err(err);
                }
            }
        }
    }
    let compiled = acc.finish();
    info!(
        event = "Compile",
        phase = "Store",
        documents = documents.len(),
        principals = compiled.len(),
    );
    Ok(compiled)
}

/// Render `template` with `variables` and compile the result.
pub fn instantiate_policy_template(
    template: &str,
    variables: &HashMap<String, String>,
    options: &CompileOptions,
) -> Result<CompiledScopes, AuthzError> {
    let rendered = render_policy_template(template, variables)?;
    debug!(event = "Template", phase = "Rendered", variables = variables.len());
    compile_document(&rendered, options)
}

fn handle_failure(index: usize, err: AuthzError, options: &CompileOptions) -> Result<(), AuthzError> {
    match options.on_error {
        ErrorMode::Abort => Err(err),
        ErrorMode::Skip => {
            warn!(event = "Compile", phase = "Skip", index, error = %err);
            Ok(())
        }
    }
}

fn reject_unsupported_conditions(policy: &CedarPolicy) -> Result<(), AuthzError> {
    if !policy.has_unsupported_conditions() {
        return Ok(());
    }
    let conditions = policy
        .conditions
        .iter()
        .map(|c| format!("{} {{ {} }}", c.kind, c.text))
        .join("; ");
    Err(AuthzError::UnsupportedPolicy(format!(
        "unsupported policy condition: {conditions}"
    )))
}

#[derive(Default)]
struct ScopeAccumulator {
    permits: IndexMap<String, IndexSet<String>>,
    forbidden: HashSet<String>,
}

impl ScopeAccumulator {
    /// Record one policy. Nothing is recorded when this fails.
    fn add(&mut self, policy: &CedarPolicy, options: &CompileOptions) -> Result<(), AuthzError> {
        reject_unsupported_conditions(policy)?;
        if policy.effect == Effect::Forbid && !options.handle_forbids {
            return Err(AuthzError::UnsupportedPolicy(
                "forbid policies are not yet fully supported; enable handle_forbids to compile them"
                    .to_string(),
            ));
        }

        let scopes = policy_scopes(policy, options.action_catalog.as_deref())?;
        debug!(
            event = "Compile",
            phase = "Policy",
            effect = %policy.effect,
            scopes = scopes.len(),
        );

        match policy.effect {
            Effect::Permit => {
                for principal in policy.principal_ids() {
                    self.permits
                        .entry(principal.to_string())
                        .or_default()
                        .extend(scopes.iter().cloned());
                }
            }
            Effect::Forbid => self.forbidden.extend(scopes),
        }
        Ok(())
    }

    fn finish(self) -> CompiledScopes {
        let forbidden = self.forbidden;
        self.permits
            .into_iter()
            .filter_map(|(principal, scopes)| {
                let kept: Vec<String> = scopes
                    .into_iter()
                    .filter(|scope| !forbidden.contains(scope))
                    .collect();
                (!kept.is_empty()).then_some((principal, kept))
            })
            .collect()
    }
}

/// Every scope a policy denotes: one per resource alternative and action.
fn policy_scopes(policy: &CedarPolicy, catalog: Option<&[String]>) -> Result<Vec<String>, AuthzError> {
    let pending: Vec<&str> = std::iter::once(policy.resource_id())
        .chain(policy.parent_ids.iter().map(String::as_str))
        .chain(policy.principal_ids())
        .chain(policy.actions.iter().map(String::as_str))
        .flat_map(placeholders)
        .unique()
        .sorted()
        .collect();
    if !pending.is_empty() {
        return Err(unresolved(pending));
    }
    if has_template_syntax(policy.resource_id()) {
        return Err(AuthzError::Template(
            "resource id contains malformed placeholders".to_string(),
        ));
    }

    let resource_ids: Vec<String> = if policy.resource_type() == S3_OBJECT {
        policy
            .parent_ids
            .iter()
            .map(|bucket| format!("{bucket}/{}", policy.resource_id()))
            .collect()
    } else {
        vec![policy.resource_id().to_string()]
    };
    let actions = expand_actions(&policy.actions, catalog);

    resource_ids
        .iter()
        .cartesian_product(actions.iter())
        .map(|(resource_id, action)| {
            Scope::new(policy.resource_type(), resource_id.as_str(), action.as_str())
                .map(|scope| scope.to_string())
        })
        .collect()
}

fn expand_actions(actions: &[String], catalog: Option<&[String]>) -> Vec<String> {
    let mut expanded: IndexSet<String> = IndexSet::new();
    for action in actions {
        match catalog {
            Some(known) if action.contains('*') => {
                let before = expanded.len();
                let glob = Glob::new(action, GlobSyntax::Star);
                expanded.extend(known.iter().filter(|candidate| glob.matches(candidate)).cloned());
                if expanded.len() == before {
                    warn!(event = "Compile", phase = "ActionExpansion", action = %action, "wildcard matched no known action");
                }
            }
            _ => {
                expanded.insert(action.clone());
            }
        }
    }
    expanded.into_iter().collect()
}
