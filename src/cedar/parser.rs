//! Recursive-descent parser for the permit/forbid policy subset.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::debug;
use utoipa::ToSchema;

use crate::error::AuthzError;

use super::entity::EntityRef;
use super::lexer::{Token, TokenKind, describe, tokenize};

pub const S3_OBJECT: &str = "S3Object";
pub const S3_BUCKET: &str = "S3Bucket";
const ACTION_TYPE: &str = "Action";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Effect {
    Permit,
    Forbid,
}

/// Operator of a scope clause.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
pub enum ClauseOp {
    #[serde(rename = "==")]
    #[strum(serialize = "==")]
    Eq,
    #[serde(rename = "in")]
    #[strum(serialize = "in")]
    In,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConditionKind {
    When,
    Unless,
}

/// A condition the compiler cannot represent as a scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Condition {
    pub kind: ConditionKind,
    pub text: String,
}

/// One parsed policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CedarPolicy {
    pub effect: Effect,
    pub principal_op: ClauseOp,
    /// A single entity for `==`; `in` may name a set.
    pub principals: Vec<EntityRef>,
    pub action_op: ClauseOp,
    /// Action entity ids, e.g. `s3:GetObject`.
    pub actions: Vec<String>,
    pub resource: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<String>,
    /// Every `resource in` alternative, first one authoritative.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parent_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl CedarPolicy {
    pub fn resource_type(&self) -> &str {
        &self.resource.entity_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }

    pub fn principal_ids(&self) -> impl Iterator<Item = &str> {
        self.principals.iter().map(|p| p.id.as_str())
    }

    pub fn has_unsupported_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }
}

/// Parse exactly one policy statement.
pub fn parse_policy(text: &str) -> Result<CedarPolicy, AuthzError> {
    let mut policies = parse_policies(text)?;
    match policies.len() {
        1 => Ok(policies.remove(0)),
        n => Err(AuthzError::PolicyParse(format!(
            "expected exactly one policy statement, found {n}"
        ))),
    }
}

/// Parse a document of `;`-terminated policy statements.
pub fn parse_policies(text: &str) -> Result<Vec<CedarPolicy>, AuthzError> {
    let tokens = tokenize(text)?;
    let mut parser = Parser::new(text, tokens);
    let mut policies = Vec::new();

    loop {
        while parser.eat(&TokenKind::Semicolon) {}
        if parser.at_end() {
            break;
        }
        let policy = parser.policy()?;
        debug!(
            event = "PolicyParse",
            effect = %policy.effect,
            resource = %policy.resource,
            actions = ?policy.actions,
            unsupported_conditions = policy.conditions.len(),
        );
        policies.push(policy);
        if !parser.at_end() && !parser.eat(&TokenKind::Semicolon) {
            return Err(parser.error("expected ';' between policy statements"));
        }
    }

    if policies.is_empty() {
        return Err(AuthzError::PolicyParse(
            "policy text contains no statements".to_string(),
        ));
    }
    Ok(policies)
}

struct Clause {
    op: ClauseOp,
    entities: Vec<EntityRef>,
    is_set: bool,
}

/// Parent candidate or captured text of one condition term.
enum Term {
    Parent(EntityRef),
    Other(String),
}

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Parser {
            source,
            tokens,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|token| &token.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, msg: &str) -> AuthzError {
        match self.peek() {
            Some(token) => AuthzError::PolicyParse(format!(
                "{msg}, found {} at byte {}",
                describe(&token.kind),
                token.start
            )),
            None => AuthzError::PolicyParse(format!("{msg}, found end of input")),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, AuthzError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.error(&format!("expected {}", describe(&kind)))),
        }
    }

    pub(crate) fn expect_end(&self) -> Result<(), AuthzError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    /// `Type::"id"` with any number of leading namespace segments.
    pub(crate) fn entity(&mut self) -> Result<EntityRef, AuthzError> {
        const SHAPE: &str = "entity must be in the form Type::\"id\"";

        let mut segments = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::Ident(name)) => segments.push(name.clone()),
                Some(TokenKind::Str(id)) if !segments.is_empty() => {
                    let id = id.clone();
                    self.pos += 1;
                    let entity_type = segments.pop().unwrap_or_default();
                    return Ok(EntityRef {
                        namespace: segments,
                        entity_type,
                        id,
                    });
                }
                _ => return Err(self.error(SHAPE)),
            }
            self.pos += 1;
            if !self.eat(&TokenKind::DoubleColon) {
                return Err(self.error(SHAPE));
            }
        }
    }

    /// A single entity or a bracketed, non-empty entity list.
    fn operand(&mut self) -> Result<(Vec<EntityRef>, bool), AuthzError> {
        if !self.eat(&TokenKind::LBracket) {
            return Ok((vec![self.entity()?], false));
        }
        let mut entities = Vec::new();
        while !self.eat(&TokenKind::RBracket) {
            entities.push(self.entity()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(TokenKind::RBracket)?;
                break;
            }
        }
        if entities.is_empty() {
            return Err(self.error("entity set must not be empty"));
        }
        Ok((entities, true))
    }

    /// `@name("value")` annotations carry no authorization meaning.
    fn skip_annotations(&mut self) -> Result<(), AuthzError> {
        while self.eat(&TokenKind::Symbol('@')) {
            match self.advance().map(|token| token.kind) {
                Some(TokenKind::Ident(_)) => {}
                _ => return Err(self.error("expected annotation name")),
            }
            if self.eat(&TokenKind::LParen) {
                match self.advance().map(|token| token.kind) {
                    Some(TokenKind::Str(_)) => {}
                    _ => return Err(self.error("expected annotation value")),
                }
                self.expect(TokenKind::RParen)?;
            }
        }
        Ok(())
    }

    fn clause(&mut self, keyword: &str) -> Result<Clause, AuthzError> {
        let op = match self.peek_kind() {
            Some(TokenKind::EqEq) => ClauseOp::Eq,
            Some(TokenKind::Ident(word)) if word == "in" => ClauseOp::In,
            Some(TokenKind::Ident(word)) if word == "is" => {
                return Err(self.error(&format!("'is' constraints are not supported on {keyword}")));
            }
            _ => {
                let article = if keyword == "action" { "an" } else { "a concrete" };
                return Err(self.error(&format!("policy must include {article} {keyword} constraint")));
            }
        };
        self.pos += 1;
        let (entities, is_set) = self.operand()?;
        if entities.iter().any(|entity| entity.id.is_empty()) {
            return Err(AuthzError::PolicyParse(format!(
                "invalid entity id in {keyword} clause"
            )));
        }
        Ok(Clause {
            op,
            entities,
            is_set,
        })
    }

    fn policy(&mut self) -> Result<CedarPolicy, AuthzError> {
        self.skip_annotations()?;

        let effect = match self.peek_kind() {
            Some(TokenKind::Ident(word)) if word == "permit" => Effect::Permit,
            Some(TokenKind::Ident(word)) if word == "forbid" => Effect::Forbid,
            _ => return Err(self.error("policy must include a permit/forbid effect")),
        };
        self.pos += 1;
        self.expect(TokenKind::LParen)?;

        let mut principal: Option<Clause> = None;
        let mut action: Option<Clause> = None;
        let mut resource: Option<Clause> = None;

        while !self.eat(&TokenKind::RParen) {
            let keyword = match self.peek_kind() {
                Some(TokenKind::Ident(word))
                    if matches!(word.as_str(), "principal" | "action" | "resource") =>
                {
                    word.clone()
                }
                _ => return Err(self.error("expected principal, action or resource")),
            };
            self.pos += 1;
            let slot = match keyword.as_str() {
                "principal" => &mut principal,
                "action" => &mut action,
                _ => &mut resource,
            };
            if slot.is_some() {
                return Err(AuthzError::PolicyParse(format!(
                    "duplicate {keyword} clause"
                )));
            }
            *slot = Some(self.clause(&keyword)?);

            if !self.eat(&TokenKind::Comma) {
                self.expect(TokenKind::RParen)?;
                break;
            }
        }

        let principal = principal.ok_or_else(|| {
            AuthzError::PolicyParse("policy must include a concrete principal".to_string())
        })?;
        let action = action.ok_or_else(|| {
            AuthzError::PolicyParse("policy must include an action constraint".to_string())
        })?;
        let resource = resource.ok_or_else(|| {
            AuthzError::PolicyParse("policy must include a concrete resource".to_string())
        })?;

        if principal.op == ClauseOp::Eq && principal.is_set {
            return Err(AuthzError::PolicyParse(
                "principal == requires a single entity".to_string(),
            ));
        }
        if action.op == ClauseOp::Eq && action.is_set {
            return Err(AuthzError::PolicyParse(
                "action == requires a single entity".to_string(),
            ));
        }
        if action
            .entities
            .iter()
            .any(|entity| entity.entity_type != ACTION_TYPE)
        {
            return Err(AuthzError::PolicyParse(
                "action constraint must reference Action entities".to_string(),
            ));
        }
        if resource.op != ClauseOp::Eq || resource.is_set {
            return Err(AuthzError::PolicyParse(
                "resource clause only supports == with a single entity".to_string(),
            ));
        }
        let Some(resource_entity) = resource.entities.into_iter().next() else {
            return Err(AuthzError::PolicyParse(
                "policy must include a concrete resource".to_string(),
            ));
        };

        let mut parents: Vec<EntityRef> = Vec::new();
        let mut conditions = Vec::new();
        while let Some(kind) = self.condition_kind() {
            self.pos += 1;
            let (terms, conjunctive_parents, text) = self.condition_body()?;
            match kind {
                ConditionKind::Unless => conditions.push(Condition { kind, text }),
                ConditionKind::When => {
                    for term in terms {
                        match term {
                            Term::Parent(entity) => parents.push(entity),
                            Term::Other(text) => conditions.push(Condition { kind, text }),
                        }
                    }
                    if conjunctive_parents {
                        conditions.push(Condition { kind, text });
                    }
                }
            }
        }

        let policy = CedarPolicy {
            effect,
            principal_op: principal.op,
            principals: principal.entities,
            action_op: action.op,
            actions: action.entities.into_iter().map(|entity| entity.id).collect(),
            resource: resource_entity,
            parent_type: parents.first().map(|parent| parent.entity_type.clone()),
            parent_ids: parents.iter().fold(Vec::new(), |mut ids, parent| {
                if !ids.contains(&parent.id) {
                    ids.push(parent.id.clone());
                }
                ids
            }),
            conditions,
        };
        validate_hierarchy(&policy, &parents)?;
        Ok(policy)
    }

    fn condition_kind(&self) -> Option<ConditionKind> {
        match self.peek_kind() {
            Some(TokenKind::Ident(word)) if word == "when" => Some(ConditionKind::When),
            Some(TokenKind::Ident(word)) if word == "unless" => Some(ConditionKind::Unless),
            _ => None,
        }
    }

    /// Parse `{ term (&&|||) term ... }`. Returns the terms, whether two
    /// differing parents were joined by `&&`, and the trimmed body text.
    fn condition_body(&mut self) -> Result<(Vec<Term>, bool, String), AuthzError> {
        let open = self.expect(TokenKind::LBrace)?;

        let body_start = self.pos;
        let mut depth = 0usize;
        let body_end = loop {
            match self.peek_kind() {
                None => return Err(self.error("unterminated condition block")),
                Some(TokenKind::RBrace) if depth == 0 => break self.pos,
                Some(TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket) => depth += 1,
                Some(TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket) => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            self.pos += 1;
        };
        let close = self.expect(TokenKind::RBrace)?;
        let text = self.source[open.end..close.start].trim().to_string();
        if body_start == body_end {
            return Err(AuthzError::PolicyParse("empty condition block".to_string()));
        }

        // Split at top-level && and ||.
        let mut segments: Vec<(usize, usize)> = Vec::new();
        let mut connectors: Vec<TokenKind> = Vec::new();
        let mut depth = 0usize;
        let mut seg_start = body_start;
        for idx in body_start..body_end {
            match &self.tokens[idx].kind {
                TokenKind::LBrace | TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RBrace | TokenKind::RParen | TokenKind::RBracket => {
                    depth = depth.saturating_sub(1)
                }
                kind @ (TokenKind::AndAnd | TokenKind::OrOr) if depth == 0 => {
                    segments.push((seg_start, idx));
                    connectors.push(kind.clone());
                    seg_start = idx + 1;
                }
                _ => {}
            }
        }
        segments.push((seg_start, body_end));

        let mut terms = Vec::with_capacity(segments.len());
        for &(start, end) in &segments {
            if start == end {
                return Err(AuthzError::PolicyParse(format!(
                    "empty condition term in '{text}'"
                )));
            }
            terms.push(self.term(start, end));
        }

        let conjunctive_parents = connectors.iter().enumerate().any(|(idx, kind)| {
            *kind == TokenKind::AndAnd
                && matches!(
                    (&terms[idx], &terms[idx + 1]),
                    (Term::Parent(left), Term::Parent(right)) if left != right
                )
        });

        Ok((terms, conjunctive_parents, text))
    }

    /// `resource in Entity` becomes a parent; anything else is captured verbatim.
    fn term(&self, start: usize, end: usize) -> Term {
        let tokens = &self.tokens[start..end];
        let text = || self.source[tokens[0].start..tokens[tokens.len() - 1].end].to_string();

        if tokens.len() < 2 || !tokens[0].is_ident("resource") || !tokens[1].is_ident("in") {
            return Term::Other(text());
        }
        let mut sub = Parser::new(self.source, tokens[2..].to_vec());
        match sub.entity() {
            Ok(entity) if sub.at_end() => Term::Parent(entity),
            _ => Term::Other(text()),
        }
    }
}

fn validate_hierarchy(policy: &CedarPolicy, parents: &[EntityRef]) -> Result<(), AuthzError> {
    let violation = |msg: &str| Err(AuthzError::HierarchyViolation(msg.to_string()));

    if !parents.is_empty() {
        if policy.resource_type() != S3_OBJECT
            || parents.iter().any(|parent| parent.entity_type != S3_BUCKET)
        {
            return violation("resource hierarchy must be S3Object in S3Bucket");
        }
        if parents.iter().any(|parent| parent.id.is_empty()) {
            return violation("parent bucket id must be non-empty");
        }
    } else if policy.resource_type() == S3_OBJECT {
        return violation("S3Object policies must include a parent S3Bucket");
    }

    if policy.resource_type() == S3_OBJECT
        && (policy.resource_id().contains("{{") || policy.resource_id().contains("}}"))
    {
        return violation("template placeholders are only allowed in bucket identifiers");
    }
    Ok(())
}
