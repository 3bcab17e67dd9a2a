use std::collections::{BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::AuthzError;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is valid"));

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

pub(crate) fn has_template_syntax(text: &str) -> bool {
    text.contains(OPEN) || text.contains(CLOSE)
}

/// Placeholder names in `text`, sorted and deduplicated.
pub(crate) fn placeholders(text: &str) -> BTreeSet<&str> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

pub(crate) fn unresolved(names: impl IntoIterator<Item = impl AsRef<str>>) -> AuthzError {
    let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
    AuthzError::Template(format!("unresolved template variables: {}", names.join(", ")))
}

/// Substitute every `{{name}}` in `template`.
///
/// Every placeholder needs a value, and no value may itself contain
/// template syntax, so the output never expands a second time.
pub fn render_policy_template(
    template: &str,
    variables: &HashMap<String, String>,
) -> Result<String, AuthzError> {
    let names = placeholders(template);
    let missing: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| !variables.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(unresolved(missing));
    }

    let mut offending: Vec<&str> = variables
        .iter()
        .filter(|(_, value)| has_template_syntax(value))
        .map(|(name, _)| name.as_str())
        .collect();
    if !offending.is_empty() {
        offending.sort_unstable();
        return Err(AuthzError::Template(format!(
            "template variable values must not contain template syntax: {}",
            offending.join(", ")
        )));
    }

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        variables
            .get(&caps[1])
            .cloned()
            .unwrap_or_default()
    });
    if has_template_syntax(&rendered) {
        return Err(AuthzError::Template(
            "template contains malformed placeholders".to_string(),
        ));
    }
    Ok(rendered.into_owned())
}
