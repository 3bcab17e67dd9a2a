//! Authorization decision returned by every enforcement path.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::location::S3Location;

/// Allow or deny, with the reason and what matched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_targets: Option<Vec<S3Location>>,
}

impl Decision {
    pub fn allow(reason: impl Into<String>, matched_scope: impl Into<String>) -> Self {
        Decision {
            allowed: true,
            reason: reason.into(),
            matched_scope: Some(matched_scope.into()),
            translated_targets: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Decision {
            allowed: false,
            reason: reason.into(),
            matched_scope: None,
            translated_targets: None,
        }
    }

    /// An allow carrying the physical targets a logical request resolved to.
    pub fn translated(
        reason: impl Into<String>,
        matched_scope: impl Into<String>,
        targets: Vec<S3Location>,
    ) -> Self {
        Decision {
            allowed: true,
            reason: reason.into(),
            matched_scope: Some(matched_scope.into()),
            translated_targets: Some(targets),
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match (self.allowed, &self.matched_scope) {
            (true, Some(scope)) => write!(f, "Allow({scope})"),
            (true, None) => write!(f, "Allow"),
            (false, _) => write!(f, "Deny({})", self.reason),
        }
    }
}
