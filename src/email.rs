//! Email entity and the closed field-name → accessor mapping used by rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// A message fetched from the remote mailbox.
///
/// `received_date` is always UTC. Build through [`Email::new`] or one of the
/// normalising constructors so naive timestamps never reach the rule engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Provider message id. Unique per stored email.
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub received_date: DateTime<Utc>,
}

impl Email {
    /// Create an email from any offset-aware timestamp, converting it to UTC.
    pub fn new<Tz: TimeZone>(
        message_id: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_date: DateTime<Tz>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            received_date: received_date.with_timezone(&Utc),
        }
    }

    /// Create an email from a timestamp without offset. The value is taken as UTC.
    pub fn from_naive(
        message_id: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        received_date: NaiveDateTime,
    ) -> Self {
        Self::new(
            message_id,
            sender,
            recipient,
            subject,
            body,
            ensure_utc(received_date),
        )
    }

    /// Look up a field by its typed name.
    pub fn field_value(&self, field: Field) -> FieldValue<'_> {
        match field {
            Field::MessageId => FieldValue::Text(&self.message_id),
            Field::Sender => FieldValue::Text(&self.sender),
            Field::Recipient => FieldValue::Text(&self.recipient),
            Field::Subject => FieldValue::Text(&self.subject),
            Field::Body => FieldValue::Text(&self.body),
            Field::ReceivedDate => FieldValue::Timestamp(self.received_date),
        }
    }
}

/// Attach UTC to a naive timestamp.
pub fn ensure_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

/// The email attributes a condition may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    MessageId,
    Sender,
    Recipient,
    Subject,
    Body,
    ReceivedDate,
}

/// What kind of value a field yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Timestamp,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::MessageId,
        Field::Sender,
        Field::Recipient,
        Field::Subject,
        Field::Body,
        Field::ReceivedDate,
    ];

    /// Attribute name as written in rule files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::MessageId => "message_id",
            Field::Sender => "sender",
            Field::Recipient => "recipient",
            Field::Subject => "subject",
            Field::Body => "body",
            Field::ReceivedDate => "received_date",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::ReceivedDate => FieldKind::Timestamp,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field names are matched exactly (case-sensitive).
impl FromStr for Field {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| MatchError::UnknownField(s.to_string()))
    }
}

/// A borrowed field value handed to predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Timestamp(DateTime<Utc>),
}
