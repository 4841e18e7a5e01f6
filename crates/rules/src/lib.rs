//! SIGMA-style detection rule engine.
//!
//! This crate provides:
//! - YAML rule definitions with serde deserialization
//! - Recursive filesystem loader that skips invalid rules instead of failing
//! - Deterministic event flattening into dotted lowercase keys
//! - Selection predicates compiled once at load time (field match / AND / OR)
//! - A condition language parsed into an AST with pre-expanded quantifiers

pub mod condition;
pub mod engine;
pub mod flatten;
pub mod loader;
pub mod schema;
pub mod selection;

pub use condition::{Condition, ConditionError};
pub use engine::{CompiledCondition, CompiledRule, RuleEngine};
pub use flatten::FlattenedEvent;
pub use loader::{LoadResult, LoadStatus, LoadedRule, RuleError, RuleLoader};
pub use schema::SigmaRule;
pub use selection::{FieldResolver, Modifier, Predicate};
