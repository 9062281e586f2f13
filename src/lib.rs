//! Inbox Rules: declarative rule engine for a remote mailbox.

pub mod config;
pub mod email;
pub mod error;
pub mod logging;
pub mod mail;
pub mod pipeline;
pub mod rules;
pub mod store;
