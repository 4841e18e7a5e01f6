//! Compiled rule set and per-event evaluation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aegis_core::MatchResult;
use serde_json::Value;
use tracing::{info, warn};

use crate::condition::{Condition, ConditionError};
use crate::flatten::FlattenedEvent;
use crate::loader::{LoadResult, LoadedRule, RuleError, RuleLoader};
use crate::schema::SigmaRule;
use crate::selection::{FieldResolver, Predicate};

/// State of a rule's condition after compilation.
#[derive(Debug, Clone)]
pub enum CompiledCondition {
    /// The detection block has no `condition` entry.
    Missing,
    /// The condition failed to parse or referenced an unknown selection.
    Invalid(ConditionError),
    Ready(Condition),
}

/// A rule with its selections and condition compiled for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: SigmaRule,
    pub source: Option<PathBuf>,
    selections: Vec<(String, Predicate)>,
    condition: CompiledCondition,
}

impl CompiledRule {
    pub fn compile(rule: SigmaRule, source: Option<PathBuf>) -> Self {
        let selections: Vec<(String, Predicate)> = rule
            .selections()
            .map(|(name, body)| (name.clone(), Predicate::compile(body)))
            .collect();
        let names: Vec<String> = selections.iter().map(|(name, _)| name.clone()).collect();

        let condition = match rule.condition() {
            None => CompiledCondition::Missing,
            Some(raw) => match Condition::from_value(raw, &names) {
                Ok(condition) => CompiledCondition::Ready(condition),
                Err(e) => {
                    let origin = source.as_deref().map(Path::display);
                    warn!(
                        title = %rule.title,
                        path = ?origin,
                        error = %e,
                        "invalid condition, rule will never match"
                    );
                    CompiledCondition::Invalid(e)
                }
            },
        };

        Self {
            rule,
            source,
            selections,
            condition,
        }
    }

    pub fn condition(&self) -> &CompiledCondition {
        &self.condition
    }

    /// Evaluate this rule against one flattened event.
    ///
    /// A missing or invalid condition is a plain non-match; only a failure
    /// during evaluation is reported as an error.
    pub fn matches(
        &self,
        event: &FlattenedEvent,
        resolver: &FieldResolver,
    ) -> Result<bool, RuleError> {
        let condition = match &self.condition {
            CompiledCondition::Ready(condition) => condition,
            CompiledCondition::Missing | CompiledCondition::Invalid(_) => return Ok(false),
        };

        let results: HashMap<String, bool> = self
            .selections
            .iter()
            .map(|(name, predicate)| (name.clone(), predicate.evaluate(event, resolver)))
            .collect();

        Ok(condition.evaluate(&results)?)
    }
}

/// Immutable rule set shared by the ingestion worker.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    resolver: FieldResolver,
}

impl RuleEngine {
    pub fn new(rules: Vec<SigmaRule>, resolver: FieldResolver) -> Self {
        Self {
            rules: rules.into_iter().map(|r| CompiledRule::compile(r, None)).collect(),
            resolver,
        }
    }

    /// Build from loaded rule files, keeping their paths for diagnostics.
    pub fn from_loaded(loaded: Vec<LoadedRule>, resolver: FieldResolver) -> Self {
        Self {
            rules: loaded
                .into_iter()
                .map(|l| CompiledRule::compile(l.rule, Some(l.path)))
                .collect(),
            resolver,
        }
    }

    /// Load every rule under `dirs` and compile it.
    pub fn load(dirs: Vec<PathBuf>, resolver: FieldResolver) -> (Self, Vec<LoadResult>) {
        let loader = RuleLoader::new(dirs);
        let (loaded, results) = loader.load_all();
        let engine = Self::from_loaded(loaded, resolver);

        let invalid = engine
            .rules
            .iter()
            .filter(|r| !matches!(r.condition, CompiledCondition::Ready(_)))
            .count();
        info!(rules = engine.len(), never_matching = invalid, "rule engine ready");

        (engine, results)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    /// Every rule whose condition holds for `event`, in load order.
    pub fn evaluate(&self, event: &Value) -> Vec<&SigmaRule> {
        let flat = FlattenedEvent::from_value(event);
        self.rules
            .iter()
            .filter(|compiled| match compiled.matches(&flat, &self.resolver) {
                Ok(hit) => hit,
                Err(e) => {
                    warn!(
                        title = %compiled.rule.title,
                        error = %e,
                        "rule evaluation failed, treating as no match"
                    );
                    false
                }
            })
            .map(|compiled| &compiled.rule)
            .collect()
    }

    /// One [`MatchResult`] per rule that fires on `event`.
    pub fn detect(&self, event: &Value) -> Vec<MatchResult> {
        self.evaluate(event)
            .into_iter()
            .map(|rule| rule.to_match(event))
            .collect()
    }
}
