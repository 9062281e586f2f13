//! Rule processor: matches one email and applies the actions of every
//! matching rule.
//!
//! Error contract, per email:
//! - A rule that fails to evaluate is reported and skipped; other rules run.
//! - The first failing action of a matched rule stops that rule's remaining
//!   actions; the following rules still run.
//! - A mailbox failure aborts the email and is returned unchanged.
//!
//! The processor keeps no record of what it has already handled. Running the
//! same email twice repeats every mutation; deduplication belongs to the
//! caller.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::email::Email;
use crate::error::{ActionError, MailStoreError, RuleError, RuleLoadError};
use crate::mail::MailStore;
use crate::rules::actions::Action;
use crate::rules::matcher::{Matcher, RuleMatch};
use crate::rules::model::{Rule, RuleSet};

/// What happened to one rule for one email.
#[derive(Debug)]
pub struct RuleOutcome {
    pub rule: String,
    pub status: RuleStatus,
}

#[derive(Debug)]
pub enum RuleStatus {
    /// Rule matched and all of its actions ran.
    Applied { actions: usize },
    /// Rule could not be evaluated, or one of its actions failed.
    Failed(RuleError),
}

/// Per-email processing summary. Non-matching rules are not listed.
#[derive(Debug)]
pub struct ProcessReport {
    pub message_id: String,
    pub outcomes: Vec<RuleOutcome>,
}

impl ProcessReport {
    /// Names of the rules whose actions all ran.
    pub fn applied_rules(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RuleStatus::Applied { .. }))
            .map(|o| o.rule.as_str())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &RuleError> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            RuleStatus::Failed(e) => Some(e),
            RuleStatus::Applied { .. } => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Drives the matcher and the action library against a mail store.
pub struct RuleProcessor {
    matcher: Matcher,
    mail_store: Arc<dyn MailStore>,
}

impl RuleProcessor {
    pub fn new(rules: Arc<RuleSet>, mail_store: Arc<dyn MailStore>) -> Self {
        Self {
            matcher: Matcher::new(rules),
            mail_store,
        }
    }

    /// Load the rule file and build a processor around it.
    pub fn from_file(
        path: impl AsRef<Path>,
        mail_store: Arc<dyn MailStore>,
    ) -> Result<Self, RuleLoadError> {
        let rules = RuleSet::load(path)?;
        Ok(Self::new(Arc::new(rules), mail_store))
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Match `email` against every rule and apply the matching rules' actions.
    pub async fn process(&self, email: &Email) -> Result<ProcessReport, MailStoreError> {
        self.process_at(email, Utc::now()).await
    }

    /// Same as [`process`](Self::process) with a fixed reference time.
    pub async fn process_at(
        &self,
        email: &Email,
        now: DateTime<Utc>,
    ) -> Result<ProcessReport, MailStoreError> {
        let evaluations = self.matcher.evaluate_at(email, now);
        let mut outcomes = Vec::new();

        for RuleMatch { rule, result } in evaluations {
            match result {
                Ok(false) => {}
                Ok(true) => {
                    debug!(rule = %rule.name, message_id = %email.message_id, "Rule matched");
                    let status = self.apply_rule(rule, email).await?;
                    outcomes.push(RuleOutcome {
                        rule: rule.name.clone(),
                        status,
                    });
                }
                Err(source) => {
                    error!(
                        rule = %rule.name,
                        message_id = %email.message_id,
                        error = %source,
                        "Rule evaluation failed"
                    );
                    outcomes.push(RuleOutcome {
                        rule: rule.name.clone(),
                        status: RuleStatus::Failed(RuleError::Match {
                            rule: rule.name.clone(),
                            source,
                        }),
                    });
                }
            }
        }

        let report = ProcessReport {
            message_id: email.message_id.clone(),
            outcomes,
        };
        info!(
            message_id = %report.message_id,
            applied = report.applied_rules().len(),
            failed = report.failures().count(),
            "Email processed"
        );
        Ok(report)
    }

    /// Run a matched rule's actions in order, stopping at the first failure.
    async fn apply_rule(&self, rule: &Rule, email: &Email) -> Result<RuleStatus, MailStoreError> {
        for (applied, spec) in rule.actions.iter().enumerate() {
            let result = match Action::resolve(spec) {
                Ok(action) => action.apply(email, self.mail_store.as_ref()).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {}
                Err(ActionError::MailStore(e)) => {
                    error!(
                        rule = %rule.name,
                        action = %spec.action_type,
                        message_id = %email.message_id,
                        error = %e,
                        "Mail store call failed"
                    );
                    return Err(e);
                }
                Err(source) => {
                    error!(
                        rule = %rule.name,
                        action = %spec.action_type,
                        message_id = %email.message_id,
                        error = %source,
                        skipped = rule.actions.len() - applied - 1,
                        "Action failed, skipping the rest of the rule"
                    );
                    return Ok(RuleStatus::Failed(RuleError::Action {
                        rule: rule.name.clone(),
                        action: spec.action_type.clone(),
                        source,
                    }));
                }
            }
        }

        Ok(RuleStatus::Applied {
            actions: rule.actions.len(),
        })
    }
}
