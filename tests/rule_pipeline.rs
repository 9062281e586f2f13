//! End-to-end: rule file on disk → orchestrator → recorded mailbox calls.

use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use inbox_rules::email::Email;
use inbox_rules::error::{MailStoreError, RuleLoadError};
use inbox_rules::mail::{MailStore, SystemLabel};
use inbox_rules::pipeline::Orchestrator;
use inbox_rules::rules::{RuleProcessor, RuleSet};
use inbox_rules::store::{EmailStore, LibSqlBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Read(String),
    Unread(String),
    Move {
        id: String,
        add: SystemLabel,
        remove: [SystemLabel; 2],
    },
}

#[derive(Default)]
struct RecordingMailbox {
    inbox: Vec<Email>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingMailbox {
    fn with(inbox: Vec<Email>) -> Arc<Self> {
        Arc::new(Self {
            inbox,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, id: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| match c {
                Call::Read(m) | Call::Unread(m) => m == id,
                Call::Move { id: m, .. } => m == id,
            })
            .collect()
    }
}

#[async_trait]
impl MailStore for RecordingMailbox {
    async fn fetch_batch(&self, max_count: usize) -> Result<Vec<Email>, MailStoreError> {
        Ok(self.inbox.iter().take(max_count).cloned().collect())
    }

    async fn get_email(&self, message_id: &str) -> Result<Email, MailStoreError> {
        self.inbox
            .iter()
            .find(|e| e.message_id == message_id)
            .cloned()
            .ok_or_else(|| MailStoreError::NotFound(message_id.to_string()))
    }

    async fn mark_as_read(&self, message_id: &str) -> Result<(), MailStoreError> {
        self.calls.lock().unwrap().push(Call::Read(message_id.into()));
        Ok(())
    }

    async fn mark_as_unread(&self, message_id: &str) -> Result<(), MailStoreError> {
        self.calls.lock().unwrap().push(Call::Unread(message_id.into()));
        Ok(())
    }

    async fn move_message(&self, message_id: &str, label: SystemLabel) -> Result<(), MailStoreError> {
        self.calls.lock().unwrap().push(Call::Move {
            id: message_id.into(),
            add: label,
            remove: label.others(),
        });
        Ok(())
    }
}

const SAMPLE_RULES: &str = r#"{
    "rules": [
        {
            "predicate": "All",
            "conditions": [
                { "field": "received_date", "predicate": "greater_than", "value": "1 day" }
            ],
            "actions": [ { "type": "mark_as_unread" } ]
        },
        {
            "predicate": "any",
            "conditions": [
                { "field": "subject", "predicate": "contains", "value": "spam" },
                { "field": "sender", "predicate": "contains", "value": "spammer.com" }
            ],
            "actions": [ { "type": "MOVE", "parameters": { "label_id": "spam" } } ]
        }
    ]
}"#;

fn rules_file(json: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

fn email(id: &str, sender: &str, subject: &str, age: TimeDelta) -> Email {
    Email::new(id, sender, "me@example.com", subject, "", Utc::now() - age)
}

#[tokio::test]
async fn sample_rules_drive_expected_mutations() {
    let file = rules_file(SAMPLE_RULES);
    let mailbox = RecordingMailbox::with(vec![
        email("old", "test@example.com", "Test Email", TimeDelta::days(2)),
        email("spam", "test@example.com", "This is spam", TimeDelta::hours(1)),
        email("spammer", "bot@spammer.com", "Hello", TimeDelta::hours(1)),
        email("fresh", "test@example.com", "Test Email", TimeDelta::hours(1)),
    ]);
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());

    let processor = RuleProcessor::from_file(file.path(), mailbox.clone()).unwrap();
    let orchestrator = Orchestrator::new(mailbox.clone(), db.clone(), processor);

    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.aborted, 0);

    assert_eq!(mailbox.calls_for("old"), vec![Call::Unread("old".into())]);
    let spam_move = |id: &str| Call::Move {
        id: id.into(),
        add: SystemLabel::Spam,
        remove: [SystemLabel::Inbox, SystemLabel::Trash],
    };
    assert_eq!(mailbox.calls_for("spam"), vec![spam_move("spam")]);
    assert_eq!(mailbox.calls_for("spammer"), vec![spam_move("spammer")]);
    assert!(mailbox.calls_for("fresh").is_empty());

    let stored = db.list_emails(10).await.unwrap();
    assert_eq!(stored.len(), 4);
}

#[tokio::test]
async fn stored_emails_are_not_reprocessed() {
    let file = rules_file(SAMPLE_RULES);
    let mailbox = RecordingMailbox::with(vec![email(
        "spam",
        "a@b.com",
        "spam!",
        TimeDelta::hours(1),
    )]);
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let processor = RuleProcessor::from_file(file.path(), mailbox.clone()).unwrap();
    let orchestrator = Orchestrator::new(mailbox.clone(), db, processor);

    orchestrator.run_once().await.unwrap();
    let second = orchestrator.run_once().await.unwrap();

    assert_eq!(second.duplicates, 1);
    assert_eq!(mailbox.calls().len(), 1);
}

#[tokio::test]
async fn bad_action_in_one_rule_leaves_the_rest_running() {
    let file = rules_file(
        r#"{ "rules": [
            { "name": "archive", "predicate": "ALL",
              "conditions": [ { "field": "subject", "predicate": "contains", "value": "report" } ],
              "actions": [
                { "type": "MOVE", "parameters": { "label_id": "ARCHIVE" } },
                { "type": "MARK_AS_READ" }
              ] },
            { "name": "trash reports", "predicate": "ALL",
              "conditions": [ { "field": "subject", "predicate": "does_not_contain", "value": "urgent" } ],
              "actions": [ { "type": "MOVE_TO_TRASH" } ] }
        ] }"#,
    );
    let mailbox = RecordingMailbox::with(vec![email("r1", "a@b.com", "Weekly report", TimeDelta::zero())]);
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let processor = RuleProcessor::from_file(file.path(), mailbox.clone()).unwrap();

    let report = processor.process(&mailbox.inbox[0]).await.unwrap();
    assert_eq!(report.applied_rules(), vec!["trash reports"]);
    assert_eq!(report.failures().count(), 1);
    assert_eq!(
        mailbox.calls(),
        vec![Call::Move {
            id: "r1".into(),
            add: SystemLabel::Trash,
            remove: [SystemLabel::Inbox, SystemLabel::Spam],
        }]
    );

    // The orchestrator counts the email as processed with a rule failure.
    let orchestrator = Orchestrator::new(mailbox.clone(), db, processor);
    let summary = orchestrator.run_once().await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.with_rule_failures, 1);
}

#[test]
fn invalid_rule_files_are_rejected_whole() {
    let unknown_field = rules_file(
        r#"{ "rules": [
            { "predicate": "ALL",
              "conditions": [ { "field": "cc", "predicate": "contains", "value": "x" } ],
              "actions": [] }
        ] }"#,
    );
    assert!(matches!(
        RuleSet::load(unknown_field.path()),
        Err(RuleLoadError::UnknownField { .. })
    ));

    let unknown_predicate = rules_file(
        r#"{ "rules": [
            { "predicate": "ALL",
              "conditions": [ { "field": "subject", "predicate": "starts_with", "value": "x" } ],
              "actions": [] }
        ] }"#,
    );
    assert!(matches!(
        RuleSet::load(unknown_predicate.path()),
        Err(RuleLoadError::UnknownPredicate { .. })
    ));

    assert!(matches!(
        RuleSet::load("/definitely/not/here.json"),
        Err(RuleLoadError::Io { .. })
    ));
}
