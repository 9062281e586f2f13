//! Rule definitions and rule-set loading.
//!
//! The JSON file is deserialized into raw `*Def` structs and then compiled
//! into typed rules. Compilation validates field names, predicate names,
//! predicate/field compatibility and duration values so a broken rule file
//! fails at startup rather than on the first email.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::email::Field;
use crate::error::{MatchError, RuleLoadError};
use crate::rules::actions::Action;
use crate::rules::predicates::{self, Predicate};

// ── File format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RuleSetDef {
    rules: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
struct RuleDef {
    #[serde(default)]
    name: Option<String>,
    predicate: String,
    conditions: Vec<ConditionDef>,
    actions: Vec<ActionSpec>,
}

#[derive(Debug, Deserialize)]
struct ConditionDef {
    field: String,
    predicate: String,
    value: String,
}

// ── Typed model ─────────────────────────────────────────────────────

/// How a rule combines its condition results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every condition must hold.
    All,
    /// At least one condition must hold.
    Any,
}

impl Combinator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Combinator::All => "ALL",
            Combinator::Any => "ANY",
        }
    }

    /// Fold condition results.
    pub fn combine(&self, results: impl IntoIterator<Item = bool>) -> bool {
        let mut results = results.into_iter();
        match self {
            Combinator::All => results.all(|r| r),
            Combinator::Any => results.any(|r| r),
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Combinator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALL" => Ok(Combinator::All),
            "ANY" => Ok(Combinator::Any),
            _ => Err(s.to_string()),
        }
    }
}

/// A single field/predicate/value test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: Field,
    pub predicate: Predicate,
    pub value: String,
}

impl Condition {
    pub fn new(field: Field, predicate: Predicate, value: impl Into<String>) -> Self {
        Self {
            field,
            predicate,
            value: value.into(),
        }
    }

    /// Build a condition from the names used in rule files.
    pub fn parse(field: &str, predicate: &str, value: impl Into<String>) -> Result<Self, MatchError> {
        Ok(Self::new(field.parse()?, predicate.parse()?, value))
    }

    /// Check that the predicate suits the field and that durations parse.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.predicate.operand_kind() != self.field.kind() {
            return Err(MatchError::TypeMismatch {
                field: self.field.to_string(),
                predicate: self.predicate.to_string(),
            });
        }
        if matches!(self.predicate, Predicate::GreaterThan | Predicate::LessThan) {
            predicates::parse_duration(&self.value)?;
        }
        Ok(())
    }
}

/// An action as written in the rule file. Resolved at apply time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl ActionSpec {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            parameters: serde_json::Map::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// A named combination of conditions and the actions to run on a match.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub name: String,
    pub combinator: Combinator,
    pub conditions: Vec<Condition>,
    pub actions: Vec<ActionSpec>,
}

/// Ordered, immutable set of rules for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build a rule set from already-typed rules, validating each.
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleLoadError> {
        for rule in &rules {
            validate_rule(rule)?;
        }
        Ok(Self { rules })
    }

    /// Skip validation. Lets tests exercise match-time errors.
    #[cfg(test)]
    pub(crate) fn from_unchecked(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Read and compile a rule file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let rule_set = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            rules = rule_set.len(),
            "Rule set loaded"
        );
        Ok(rule_set)
    }

    /// Compile a rule set from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, RuleLoadError> {
        let def: RuleSetDef = serde_json::from_str(json)?;
        let rules = def
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| compile_rule(index, rule))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

fn compile_rule(index: usize, def: RuleDef) -> Result<Rule, RuleLoadError> {
    let name = def.name.unwrap_or_else(|| format!("rule #{}", index + 1));

    let combinator = def
        .predicate
        .parse::<Combinator>()
        .map_err(|value| RuleLoadError::InvalidRulePredicate {
            rule: name.clone(),
            value,
        })?;

    let conditions = def
        .conditions
        .into_iter()
        .map(|c| {
            let field = c.field.parse::<Field>().map_err(|_| RuleLoadError::UnknownField {
                rule: name.clone(),
                field: c.field.clone(),
            })?;
            let predicate =
                c.predicate
                    .parse::<Predicate>()
                    .map_err(|_| RuleLoadError::UnknownPredicate {
                        rule: name.clone(),
                        predicate: c.predicate.clone(),
                    })?;
            Ok(Condition::new(field, predicate, c.value))
        })
        .collect::<Result<Vec<_>, RuleLoadError>>()?;

    Ok(Rule {
        name,
        combinator,
        conditions,
        actions: def.actions,
    })
}

fn validate_rule(rule: &Rule) -> Result<(), RuleLoadError> {
    if rule.conditions.is_empty() {
        return Err(RuleLoadError::NoConditions {
            rule: rule.name.clone(),
        });
    }

    for condition in &rule.conditions {
        match condition.validate() {
            Ok(()) => {}
            Err(MatchError::TypeMismatch { field, predicate }) => {
                return Err(RuleLoadError::KindMismatch {
                    rule: rule.name.clone(),
                    field,
                    predicate,
                });
            }
            Err(source) => {
                return Err(RuleLoadError::BadDuration {
                    rule: rule.name.clone(),
                    source,
                });
            }
        }
    }

    // Bad actions only fail the rule when it fires; flag them early.
    for spec in &rule.actions {
        if let Err(e) = Action::resolve(spec) {
            warn!(
                rule = %rule.name,
                action = %spec.action_type,
                error = %e,
                "Rule contains an action that will fail when applied"
            );
        }
    }

    debug!(
        rule = %rule.name,
        combinator = %rule.combinator,
        conditions = rule.conditions.len(),
        actions = rule.actions.len(),
        "Rule validated"
    );
    Ok(())
}
