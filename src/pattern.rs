use regex::Regex;
use tracing::warn;

/// Which glob metacharacters a pattern understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlobSyntax {
    /// Only `*` (any run of characters, including none).
    Star,
    /// `*` plus `?` (exactly one character), shell style.
    Shell,
}

/// Compile a glob into an anchored regex. Everything that is not a
/// metacharacter is matched literally.
pub(crate) fn glob_regex(pattern: &str, syntax: GlobSyntax) -> Result<Regex, regex::Error> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        let meta = match ch {
            '*' => Some(".*"),
            '?' if syntax == GlobSyntax::Shell => Some("."),
            _ => None,
        };
        match meta {
            Some(re) => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(re);
            }
            None => literal.push(ch),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');
    Regex::new(&source)
}

/// A glob compiled once and matched many times. A pattern that fails to
/// compile matches nothing.
#[derive(Debug, Clone)]
pub(crate) enum Glob {
    Exact(String),
    Pattern(Regex),
    Never,
}

impl Glob {
    pub(crate) fn new(pattern: &str, syntax: GlobSyntax) -> Self {
        if !pattern.contains('*') && !(syntax == GlobSyntax::Shell && pattern.contains('?')) {
            return Glob::Exact(pattern.to_string());
        }
        match glob_regex(pattern, syntax) {
            Ok(re) => Glob::Pattern(re),
            Err(err) => {
                warn!(event = "Pattern", phase = "Compile", pattern, error = %err);
                Glob::Never
            }
        }
    }

    pub(crate) fn matches(&self, value: &str) -> bool {
        match self {
            Glob::Exact(expected) => value == expected,
            Glob::Pattern(re) => re.is_match(value),
            Glob::Never => false,
        }
    }
}

/// One-off glob match; loops should build a [`Glob`] once instead.
pub(crate) fn glob_match(value: &str, pattern: &str, syntax: GlobSyntax) -> bool {
    Glob::new(pattern, syntax).matches(value)
}
