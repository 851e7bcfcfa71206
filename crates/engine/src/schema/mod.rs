//! YAML rule DSL schema types with serde deserialization.
//!
//! Defines the type hierarchy for rule documents:
//! - `Rule`: one migration/compliance rule with its `when` condition tree
//! - `Condition`: tagged union decoded via explicit `and:`/`or:` keys,
//!   otherwise a `<provider>.<capability>` leaf
//! - `RuleSet`: a named collection of rules (bare array or envelope form)

mod condition;
mod rule;
mod ruleset;

pub use condition::*;
pub use rule::*;
pub use ruleset::*;
