//! Declarative rule evaluation engine.
//!
//! This crate provides:
//! - YAML rule schema with serde deserialization (AND/OR/NOT condition trees)
//! - Filesystem loader with structural validation and capability resolution
//! - Label selector expressions for filtering rules and dependencies
//! - Condition evaluator with dependency-ordered chain-template propagation
//! - Concurrent rule scheduler with a bounded worker pool
//! - Incident aggregation into stable, sorted rule-set results

pub mod engine;
pub mod evaluator;
pub mod loader;
pub mod output;
pub mod schema;
pub mod selector;
pub mod snippet;

pub use engine::{EngineConfig, RuleEngine};
pub use evaluator::{ConditionEvaluator, EvalContext, EvalError, EvalResult};
pub use loader::RuleLoader;
pub use output::{RuleSetResult, Violation};
pub use selector::{LabelSelector, Labeled};
