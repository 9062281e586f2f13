//! Rule matcher. Evaluates rules against an email.
//!
//! Pure: no mailbox access, no actions. Time predicates compare against a
//! single "now" captured per evaluation, so the same stored email can match
//! differently later in a long-running process.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::email::Email;
use crate::error::{MatchError, RuleError};
use crate::rules::model::{Condition, Rule, RuleSet};

/// Outcome of evaluating one rule against one email.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    pub rule: &'a Rule,
    pub result: Result<bool, MatchError>,
}

/// Matches emails against a shared, read-only rule set.
#[derive(Debug, Clone)]
pub struct Matcher {
    rules: Arc<RuleSet>,
}

impl Matcher {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Matching rules in rule-set order. The first evaluation error aborts.
    pub fn matching_rules(&self, email: &Email) -> Result<Vec<&Rule>, RuleError> {
        self.matching_rules_at(email, Utc::now())
    }

    pub fn matching_rules_at(
        &self,
        email: &Email,
        now: DateTime<Utc>,
    ) -> Result<Vec<&Rule>, RuleError> {
        let mut matched = Vec::new();
        for RuleMatch { rule, result } in self.evaluate_at(email, now) {
            match result {
                Ok(true) => matched.push(rule),
                Ok(false) => {}
                Err(source) => {
                    return Err(RuleError::Match {
                        rule: rule.name.clone(),
                        source,
                    });
                }
            }
        }
        Ok(matched)
    }

    /// Evaluate every rule, keeping per-rule errors separate.
    pub fn evaluate(&self, email: &Email) -> Vec<RuleMatch<'_>> {
        self.evaluate_at(email, Utc::now())
    }

    pub fn evaluate_at(&self, email: &Email, now: DateTime<Utc>) -> Vec<RuleMatch<'_>> {
        self.rules
            .iter()
            .map(|rule| RuleMatch {
                rule,
                result: rule_matches(rule, email, now),
            })
            .collect()
    }
}

/// Evaluate a single rule.
///
/// Every condition is evaluated, even once the outcome is decided, so a
/// broken condition is always reported.
pub fn rule_matches(rule: &Rule, email: &Email, now: DateTime<Utc>) -> Result<bool, MatchError> {
    let results = rule
        .conditions
        .iter()
        .map(|condition| condition_matches(condition, email, now))
        .collect::<Result<Vec<bool>, MatchError>>()?;

    let matched = rule.combinator.combine(results);
    trace!(
        rule = %rule.name,
        message_id = %email.message_id,
        matched,
        "Rule evaluated"
    );
    Ok(matched)
}

/// Evaluate a single condition.
pub fn condition_matches(
    condition: &Condition,
    email: &Email,
    now: DateTime<Utc>,
) -> Result<bool, MatchError> {
    let value = email.field_value(condition.field);
    condition
        .predicate
        .evaluate(condition.field.as_str(), value, &condition.value, now)
}
