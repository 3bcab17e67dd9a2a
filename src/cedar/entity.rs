//! Entity references of the form `Type::"id"` or `Ns::Type::"id"`.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AuthzError;

use super::lexer::tokenize;
use super::parser::Parser;

/// A parsed entity reference. Only the trailing type segment is kept as
/// `entity_type`; any namespace is retained separately for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct EntityRef {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace: Vec<String>,
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        EntityRef {
            namespace: Vec::new(),
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// `Ns::Type`, or just `Type` without a namespace.
    pub fn qualified_type(&self) -> String {
        self.namespace
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.entity_type.as_str()))
            .collect::<Vec<_>>()
            .join("::")
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}::{:?}", self.qualified_type(), self.id)
    }
}

impl FromStr for EntityRef {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        let mut parser = Parser::new(s, tokens);
        let entity = parser.entity()?;
        parser.expect_end()?;
        if entity.id.is_empty() {
            return Err(AuthzError::PolicyParse(
                "entity id must be non-empty".to_string(),
            ));
        }
        Ok(entity)
    }
}

/// Parse `Type::"id"` into `(type, id)`, keeping only the last type segment.
pub fn parse_entity(entity: &str) -> Result<(String, String), AuthzError> {
    let parsed: EntityRef = entity.trim().parse()?;
    Ok((parsed.entity_type, parsed.id))
}
