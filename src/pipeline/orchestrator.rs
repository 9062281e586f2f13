//! Fetch → dedup → persist → process.
//!
//! One run pulls a batch from the mailbox, drops emails already stored (or
//! repeated within the batch), persists the rest sequentially, then hands the
//! persisted emails to the rule processor with bounded concurrency.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::email::Email;
use crate::error::Result;
use crate::mail::MailStore;
use crate::rules::RuleProcessor;
use crate::store::EmailStore;

pub const DEFAULT_MAX_EMAILS: usize = 10;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Counters for one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    /// Already stored, or repeated within the batch.
    pub duplicates: usize,
    /// Skipped because lookup or insert failed.
    pub persist_failed: usize,
    pub processed: usize,
    /// Emails processed with at least one failed rule.
    pub with_rule_failures: usize,
    /// Emails aborted by a mailbox error.
    pub aborted: usize,
}

pub struct Orchestrator {
    mail_store: Arc<dyn MailStore>,
    email_store: Arc<dyn EmailStore>,
    processor: RuleProcessor,
    max_emails: usize,
    concurrency: usize,
}

impl Orchestrator {
    pub fn new(
        mail_store: Arc<dyn MailStore>,
        email_store: Arc<dyn EmailStore>,
        processor: RuleProcessor,
    ) -> Self {
        Self {
            mail_store,
            email_store,
            processor,
            max_emails: DEFAULT_MAX_EMAILS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_max_emails(mut self, max_emails: usize) -> Self {
        self.max_emails = max_emails.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Run one fetch/persist/process cycle.
    ///
    /// Only a failed fetch is an error. Per-email failures are logged and
    /// counted in the summary.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let batch = self.mail_store.fetch_batch(self.max_emails).await?;
        let mut summary = RunSummary {
            fetched: batch.len(),
            ..Default::default()
        };

        let unseen = self.persist_unseen(batch, &mut summary).await;

        let processor = &self.processor;
        let results: Vec<_> = futures::stream::iter(unseen)
            .map(|email| async move {
                let result = processor.process(&email).await;
                (email.message_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (message_id, result) in results {
            match result {
                Ok(report) => {
                    summary.processed += 1;
                    if !report.is_clean() {
                        summary.with_rule_failures += 1;
                    }
                }
                Err(e) => {
                    error!(message_id = %message_id, error = %e, "Email processing aborted");
                    summary.aborted += 1;
                }
            }
        }

        info!(
            fetched = summary.fetched,
            duplicates = summary.duplicates,
            persist_failed = summary.persist_failed,
            processed = summary.processed,
            with_rule_failures = summary.with_rule_failures,
            aborted = summary.aborted,
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// Store every email not seen before and return those, in batch order.
    async fn persist_unseen(&self, batch: Vec<Email>, summary: &mut RunSummary) -> Vec<Email> {
        let mut seen_in_batch = HashSet::new();
        let mut unseen = Vec::with_capacity(batch.len());

        for email in batch {
            if !seen_in_batch.insert(email.message_id.clone()) {
                debug!(message_id = %email.message_id, "Repeated within batch");
                summary.duplicates += 1;
                continue;
            }

            match self.email_store.find_by_message_id(&email.message_id).await {
                Ok(Some(_)) => {
                    debug!(message_id = %email.message_id, "Already processed");
                    summary.duplicates += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(message_id = %email.message_id, error = %e, "Lookup failed, skipping");
                    summary.persist_failed += 1;
                    continue;
                }
            }

            match self.email_store.insert_email(&email).await {
                Ok(id) => {
                    debug!(id = %id, message_id = %email.message_id, "Persisted email");
                    unseen.push(email);
                }
                Err(e) => {
                    error!(message_id = %email.message_id, error = %e, "Failed to persist email");
                    summary.persist_failed += 1;
                }
            }
        }

        unseen
    }

    /// Spawn a background task that runs the pipeline every `interval`.
    ///
    /// Returns a `JoinHandle` and a shutdown sender. Sending `true` (or
    /// dropping the sender) stops the poller without waiting for the next
    /// tick; a run already in progress completes first.
    pub fn spawn_poller(self: Arc<Self>, interval: Duration) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Mailbox poller started");
            let mut tick = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = shutdown_rx.changed() => {
                        info!("Mailbox poller shutting down");
                        return;
                    }
                }

                if let Err(e) = self.run_once().await {
                    error!(error = %e, "Pipeline run failed");
                }
            }
        });

        (handle, shutdown_tx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::error::{Error, MailStoreError};
    use crate::mail::SystemLabel;
    use crate::rules::RuleSet;
    use crate::store::LibSqlBackend;

    /// Serves a fixed batch and records label mutations.
    struct FakeMailbox {
        batch: Vec<Email>,
        fail_fetch: bool,
        /// Message ids whose mutations fail.
        broken: HashSet<String>,
        moves: Mutex<Vec<(String, SystemLabel)>>,
        unread: Mutex<Vec<String>>,
    }

    impl FakeMailbox {
        fn new(batch: Vec<Email>) -> Self {
            Self {
                batch,
                fail_fetch: false,
                broken: HashSet::new(),
                moves: Mutex::new(Vec::new()),
                unread: Mutex::new(Vec::new()),
            }
        }

        fn check(&self, id: &str) -> std::result::Result<(), MailStoreError> {
            if self.broken.contains(id) {
                return Err(MailStoreError::NotFound(id.to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl MailStore for FakeMailbox {
        async fn fetch_batch(&self, max: usize) -> std::result::Result<Vec<Email>, MailStoreError> {
            if self.fail_fetch {
                return Err(MailStoreError::AuthExpired);
            }
            Ok(self.batch.iter().take(max).cloned().collect())
        }

        async fn get_email(&self, id: &str) -> std::result::Result<Email, MailStoreError> {
            self.batch
                .iter()
                .find(|e| e.message_id == id)
                .cloned()
                .ok_or_else(|| MailStoreError::NotFound(id.to_string()))
        }

        async fn mark_as_read(&self, id: &str) -> std::result::Result<(), MailStoreError> {
            self.check(id)
        }

        async fn mark_as_unread(&self, id: &str) -> std::result::Result<(), MailStoreError> {
            self.check(id)?;
            self.unread.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn move_message(
            &self,
            id: &str,
            label: SystemLabel,
        ) -> std::result::Result<(), MailStoreError> {
            self.check(id)?;
            self.moves.lock().unwrap().push((id.to_string(), label));
            Ok(())
        }
    }

    const RULES: &str = r#"{
        "rules": [
            {
                "predicate": "ALL",
                "conditions": [ { "field": "received_date", "predicate": "greater_than", "value": "1 day" } ],
                "actions": [ { "type": "MARK_AS_UNREAD" } ]
            },
            {
                "predicate": "ANY",
                "conditions": [ { "field": "subject", "predicate": "contains", "value": "spam" } ],
                "actions": [ { "type": "MOVE_TO_SPAM" } ]
            }
        ]
    }"#;

    fn email(id: &str, subject: &str, age: TimeDelta) -> Email {
        Email::new(id, "x@y.com", "me@y.com", subject, "", Utc::now() - age)
    }

    async fn orchestrator(mailbox: Arc<FakeMailbox>) -> (Orchestrator, Arc<LibSqlBackend>) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let rules = Arc::new(RuleSet::from_json(RULES).unwrap());
        let processor = RuleProcessor::new(rules, mailbox.clone());
        let orch = Orchestrator::new(mailbox, db.clone(), processor);
        (orch, db)
    }

    #[tokio::test]
    async fn processes_and_persists_new_emails() {
        let mailbox = Arc::new(FakeMailbox::new(vec![
            email("old", "hello", TimeDelta::days(2)),
            email("spam", "buy spam now", TimeDelta::hours(1)),
            email("fresh", "hello", TimeDelta::hours(1)),
        ]));
        let (orch, db) = orchestrator(mailbox.clone()).await;

        let summary = orch.run_once().await.unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.duplicates, 0);

        assert_eq!(*mailbox.unread.lock().unwrap(), vec!["old".to_string()]);
        assert_eq!(
            *mailbox.moves.lock().unwrap(),
            vec![("spam".to_string(), SystemLabel::Spam)]
        );
        for id in ["old", "spam", "fresh"] {
            assert!(db.find_by_message_id(id).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn second_run_skips_stored_emails() {
        let mailbox = Arc::new(FakeMailbox::new(vec![email("old", "hi", TimeDelta::days(3))]));
        let (orch, _db) = orchestrator(mailbox.clone()).await;

        orch.run_once().await.unwrap();
        let second = orch.run_once().await.unwrap();

        assert_eq!(second.duplicates, 1);
        assert_eq!(second.processed, 0);
        assert_eq!(mailbox.unread.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn repeated_ids_in_one_batch_are_processed_once() {
        let mailbox = Arc::new(FakeMailbox::new(vec![
            email("dup", "spam", TimeDelta::hours(1)),
            email("dup", "spam", TimeDelta::hours(1)),
        ]));
        let (orch, _db) = orchestrator(mailbox.clone()).await;

        let summary = orch.run_once().await.unwrap();
        assert_eq!(summary.duplicates, 1);
        assert_eq!(mailbox.moves.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_failing_email_does_not_stop_the_batch() {
        let mut mailbox = FakeMailbox::new(vec![
            email("gone", "spam", TimeDelta::hours(1)),
            email("ok", "spam", TimeDelta::hours(1)),
        ]);
        mailbox.broken.insert("gone".to_string());
        let mailbox = Arc::new(mailbox);
        let (orch, _db) = orchestrator(mailbox.clone()).await;

        let summary = orch.run_once().await.unwrap();
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(
            *mailbox.moves.lock().unwrap(),
            vec![("ok".to_string(), SystemLabel::Spam)]
        );
    }

    #[tokio::test]
    async fn failed_fetch_is_an_error() {
        let mut mailbox = FakeMailbox::new(Vec::new());
        mailbox.fail_fetch = true;
        let (orch, _db) = orchestrator(Arc::new(mailbox)).await;

        let err = orch.run_once().await.unwrap_err();
        assert!(matches!(err, Error::MailStore(MailStoreError::AuthExpired)));
    }

    #[tokio::test]
    async fn batch_size_is_capped() {
        let mailbox = Arc::new(FakeMailbox::new(vec![
            email("a", "hi", TimeDelta::hours(1)),
            email("b", "hi", TimeDelta::hours(1)),
            email("c", "hi", TimeDelta::hours(1)),
        ]));
        let (orch, _db) = orchestrator(mailbox).await;
        let summary = orch.with_max_emails(2).with_concurrency(1).run_once().await.unwrap();
        assert_eq!(summary.fetched, 2);
    }

    #[tokio::test]
    async fn poller_stops_on_shutdown_signal() {
        let mailbox = Arc::new(FakeMailbox::new(vec![email("old", "hi", TimeDelta::days(2))]));
        let (orch, db) = orchestrator(mailbox).await;

        let (handle, shutdown) = Arc::new(orch).spawn_poller(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(db.find_by_message_id("old").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn shutdown_does_not_wait_for_next_tick() {
        let mailbox = Arc::new(FakeMailbox::new(Vec::new()));
        let (orch, _db) = orchestrator(mailbox).await;

        let (handle, shutdown) = Arc::new(orch).spawn_poller(Duration::from_secs(3600));
        // Let the immediate first run finish and the loop park on the next tick.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller kept running after shutdown")
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn dropping_the_sender_stops_the_poller() {
        let mailbox = Arc::new(FakeMailbox::new(Vec::new()));
        let (orch, _db) = orchestrator(mailbox).await;

        let (handle, shutdown) = Arc::new(orch).spawn_poller(Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
