//! Mailbox pipeline.
//!
//! Every fetched email flows through:
//! 1. `MailStore::fetch_batch()`: pull recent messages
//! 2. `EmailStore` lookup/insert: skip anything already seen
//! 3. `RuleProcessor::process()`: match rules and apply actions

pub mod orchestrator;

pub use orchestrator::{Orchestrator, RunSummary};
