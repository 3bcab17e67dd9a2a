//! Schema checks for policies before they are compiled.
//!
//! [`validate_against_schema`] runs the full Cedar validator over the
//! statement. [`PolicySchema`] is a lightweight allow-list over the parsed
//! policy for callers without a Cedar schema document.

use std::collections::{BTreeMap, BTreeSet};

use cedar_policy::{PolicySet, Schema, ValidationMode, Validator};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::error::AuthzError;

use super::parser::CedarPolicy;

/// Validate policy text against a Cedar schema document.
pub fn validate_against_schema(statement: &str, schema_text: &str) -> Result<(), AuthzError> {
    let schema = schema_text
        .parse::<Schema>()
        .map_err(|e| AuthzError::Schema(e.to_string()))?;
    let policies: PolicySet = statement.parse()?;

    let validator = Validator::new(schema);
    let result = validator.validate(&policies, ValidationMode::default());
    if result.validation_passed() {
        debug!(event = "SchemaValidation", result = "passed");
        return Ok(());
    }

    let errors: Vec<String> = result
        .validation_errors()
        .map(|err| err.to_string())
        .collect();
    warn!(event = "SchemaValidation", result = "failed", errors = ?errors);
    Err(AuthzError::Schema(errors.join("; ")))
}

/// Known resource types, actions and (optionally) principal types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PolicySchema {
    pub resource_types: BTreeSet<String>,
    pub actions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_types: Option<BTreeSet<String>>,
    /// Action id to the resource types it may apply to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_constraints: Option<BTreeMap<String, Vec<String>>>,
}

impl PolicySchema {
    pub fn new<R, A>(resource_types: R, actions: A) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        PolicySchema {
            resource_types: resource_types.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
            principal_types: None,
            action_constraints: None,
        }
    }

    pub fn with_principal_types<P>(mut self, principal_types: P) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
    {
        self.principal_types = Some(principal_types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_action_constraint<R>(mut self, action: impl Into<String>, resource_types: R) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
    {
        self.action_constraints
            .get_or_insert_with(BTreeMap::new)
            .insert(
                action.into(),
                resource_types.into_iter().map(Into::into).collect(),
            );
        self
    }

    /// Derive the allow-list from a Cedar schema document. Entity types and
    /// actions are keyed by their unqualified names.
    pub fn from_cedar_schema(schema_text: &str) -> Result<Self, AuthzError> {
        let schema = schema_text
            .parse::<Schema>()
            .map_err(|e| AuthzError::Schema(e.to_string()))?;
        Ok(PolicySchema::new(
            schema
                .entity_types()
                .map(|entity_type| entity_type.basename().to_string()),
            schema
                .actions()
                .map(|action| action.id().unescaped().to_string()),
        ))
    }

    /// Reject policies naming unknown resource types, actions or principals.
    pub fn validate(&self, policy: &CedarPolicy) -> Result<(), AuthzError> {
        let resource_type = policy.resource_type();
        if !self.resource_types.contains(resource_type) {
            return Err(AuthzError::Schema(format!(
                "unknown resource type: {resource_type}"
            )));
        }

        for action in &policy.actions {
            if !self.actions.contains(action) {
                return Err(AuthzError::Schema(format!("unknown action: {action}")));
            }
            let allowed = self
                .action_constraints
                .as_ref()
                .and_then(|constraints| constraints.get(action))
                .filter(|allowed| !allowed.is_empty());
            if allowed.is_some_and(|allowed| !allowed.iter().any(|t| t == resource_type)) {
                return Err(AuthzError::Schema(format!(
                    "action {action} cannot be applied to resource type {resource_type}"
                )));
            }
        }

        if let Some(principal_types) = &self.principal_types {
            for principal in &policy.principals {
                if !principal_types.contains(&principal.entity_type) {
                    return Err(AuthzError::Schema(format!(
                        "unknown principal type: {}",
                        principal.entity_type
                    )));
                }
            }
        }
        Ok(())
    }
}
