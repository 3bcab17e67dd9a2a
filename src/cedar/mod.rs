//! The restricted Cedar subset accepted by the policy compiler.
//!
//! Statements have the shape
//! `permit|forbid (principal .., action .., resource == ..) [when { resource in .. }];`.
//! Anything beyond the `resource in` hierarchy inside a condition is kept as
//! an unsupported condition so that the compiler can refuse the statement.

mod entity;
mod lexer;
mod parser;
pub mod schema;

pub use entity::{EntityRef, parse_entity};
pub use parser::{
    CedarPolicy, ClauseOp, Condition, ConditionKind, Effect, S3_BUCKET, S3_OBJECT, parse_policies,
    parse_policy,
};
pub use schema::{PolicySchema, validate_against_schema};
