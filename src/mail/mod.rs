//! Remote mailbox collaborator.
//!
//! The rule engine only talks to the mailbox through [`MailStore`]. The Gmail
//! REST adapter lives in [`gmail`].

pub mod gmail;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::email::Email;
use crate::error::{ActionError, MailStoreError};

pub use gmail::{GmailConfig, GmailMailStore};

/// Folder-like system labels. An email carries exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemLabel {
    Inbox,
    Spam,
    Trash,
}

impl SystemLabel {
    pub const ALL: [SystemLabel; 3] = [SystemLabel::Inbox, SystemLabel::Spam, SystemLabel::Trash];

    pub const ALL_NAMES: &'static str = "INBOX, SPAM, TRASH";

    /// Provider label id.
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemLabel::Inbox => "INBOX",
            SystemLabel::Spam => "SPAM",
            SystemLabel::Trash => "TRASH",
        }
    }

    /// The two labels that must be removed when moving to `self`.
    pub fn others(&self) -> [SystemLabel; 2] {
        match self {
            SystemLabel::Inbox => [SystemLabel::Spam, SystemLabel::Trash],
            SystemLabel::Spam => [SystemLabel::Inbox, SystemLabel::Trash],
            SystemLabel::Trash => [SystemLabel::Inbox, SystemLabel::Spam],
        }
    }
}

impl fmt::Display for SystemLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SystemLabel {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        SystemLabel::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ActionError::UnsupportedLabel(s.to_string()))
    }
}

/// Read and mutate access to the remote mailbox.
///
/// Implementations may be called concurrently for distinct message ids.
/// Callers must not issue concurrent calls for the same id.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// Fetch up to `max_count` recent messages with full details.
    async fn fetch_batch(&self, max_count: usize) -> Result<Vec<Email>, MailStoreError>;

    /// Fetch one message by provider id.
    async fn get_email(&self, message_id: &str) -> Result<Email, MailStoreError>;

    async fn mark_as_read(&self, message_id: &str) -> Result<(), MailStoreError>;

    async fn mark_as_unread(&self, message_id: &str) -> Result<(), MailStoreError>;

    /// Add `label` and remove the other system labels in a single request.
    async fn move_message(&self, message_id: &str, label: SystemLabel)
    -> Result<(), MailStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("inbox".parse::<SystemLabel>().unwrap(), SystemLabel::Inbox);
        assert_eq!("Spam".parse::<SystemLabel>().unwrap(), SystemLabel::Spam);
        assert_eq!("TRASH".parse::<SystemLabel>().unwrap(), SystemLabel::Trash);
    }

    #[test]
    fn unsupported_label_is_rejected() {
        let err = "DRAFT".parse::<SystemLabel>().unwrap_err();
        assert!(matches!(err, ActionError::UnsupportedLabel(ref l) if l == "DRAFT"));
        assert!(err.to_string().contains("INBOX, SPAM, TRASH"));
    }

    #[test]
    fn others_are_the_remaining_system_labels() {
        for label in SystemLabel::ALL {
            let others = label.others();
            assert!(!others.contains(&label));
            assert_ne!(others[0], others[1]);
        }
    }
}
