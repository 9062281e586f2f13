//! Error types for inbox-rules.

use crate::mail::SystemLabel;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rule set error: {0}")]
    RuleLoad(#[from] RuleLoadError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail store error: {0}")]
    MailStore(#[from] MailStoreError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while reading and validating a rule set.
///
/// Any of these rejects the whole file.
#[derive(Debug, thiserror::Error)]
pub enum RuleLoadError {
    #[error("Failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed rule file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rule '{rule}' has no conditions")]
    NoConditions { rule: String },

    #[error("Rule '{rule}': invalid rule predicate '{value}' (expected ALL or ANY)")]
    InvalidRulePredicate { rule: String, value: String },

    #[error("Rule '{rule}': unknown field '{field}'")]
    UnknownField { rule: String, field: String },

    #[error("Rule '{rule}': unknown predicate '{predicate}'")]
    UnknownPredicate { rule: String, predicate: String },

    #[error("Rule '{rule}': predicate '{predicate}' cannot be applied to field '{field}'")]
    KindMismatch {
        rule: String,
        field: String,
        predicate: String,
    },

    #[error("Rule '{rule}': {source}")]
    BadDuration {
        rule: String,
        #[source]
        source: MatchError,
    },
}

/// Errors raised while evaluating a condition against an email.
///
/// A `MatchError` is never the same thing as "did not match".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown predicate '{0}'")]
    UnknownPredicate(String),

    #[error("bad duration '{value}': {reason}")]
    BadDuration { value: String, reason: String },

    #[error("predicate '{predicate}' cannot be applied to field '{field}'")]
    TypeMismatch { field: String, predicate: String },
}

/// Errors raised while resolving or applying an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("invalid action type '{0}'")]
    InvalidActionType(String),

    #[error("action '{action}' requires parameter '{parameter}'")]
    MissingParameter { action: String, parameter: String },

    #[error("action '{action}': parameter '{parameter}' must be a string")]
    InvalidParameter { action: String, parameter: String },

    #[error("unsupported label '{0}' (only {labels} are supported)", labels = SystemLabel::ALL_NAMES)]
    UnsupportedLabel(String),

    #[error(transparent)]
    MailStore(#[from] MailStoreError),
}

/// Failure of one rule for one email, as recorded by the processor.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("rule '{rule}' could not be evaluated: {source}")]
    Match {
        rule: String,
        #[source]
        source: MatchError,
    },

    #[error("rule '{rule}' action '{action}' failed: {source}")]
    Action {
        rule: String,
        action: String,
        #[source]
        source: ActionError,
    },
}

/// Errors from the remote mailbox collaborator.
#[derive(Debug, thiserror::Error)]
pub enum MailStoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Access token expired or revoked")]
    AuthExpired,

    #[error("Message {0} not found")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed message {id}: {reason}")]
    MalformedMessage { id: String, reason: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
