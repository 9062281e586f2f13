//! Action library: turns an [`ActionSpec`] into a mailbox mutation.
//!
//! Resolution (type name, parameters, label) completes before any call is
//! made, so a bad action never produces a partial mutation.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::email::Email;
use crate::error::ActionError;
use crate::mail::{MailStore, SystemLabel};
use crate::rules::model::ActionSpec;

/// Parameter holding the target label of a generic move.
pub const LABEL_PARAMETER: &str = "label_id";

/// The registered action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    MarkAsRead,
    MarkAsUnread,
    MoveToInbox,
    MoveToSpam,
    MoveToTrash,
    Move,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MarkAsRead => "MARK_AS_READ",
            ActionKind::MarkAsUnread => "MARK_AS_UNREAD",
            ActionKind::MoveToInbox => "MOVE_TO_INBOX",
            ActionKind::MoveToSpam => "MOVE_TO_SPAM",
            ActionKind::MoveToTrash => "MOVE_TO_TRASH",
            ActionKind::Move => "MOVE",
        }
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        match normalized.as_str() {
            "MARK_AS_READ" | "MARK_READ" => Ok(ActionKind::MarkAsRead),
            "MARK_AS_UNREAD" | "MARK_UNREAD" => Ok(ActionKind::MarkAsUnread),
            "MOVE_TO_INBOX" => Ok(ActionKind::MoveToInbox),
            "MOVE_TO_SPAM" => Ok(ActionKind::MoveToSpam),
            "MOVE_TO_TRASH" => Ok(ActionKind::MoveToTrash),
            "MOVE" | "MOVE_MESSAGE" => Ok(ActionKind::Move),
            _ => Err(ActionError::InvalidActionType(s.to_string())),
        }
    }
}

/// A fully resolved action, ready to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MarkAsRead,
    MarkAsUnread,
    Move(SystemLabel),
}

impl Action {
    /// Resolve a rule-file action into a typed action.
    pub fn resolve(spec: &ActionSpec) -> Result<Self, ActionError> {
        let kind: ActionKind = spec.action_type.parse()?;
        match kind {
            ActionKind::MarkAsRead => Ok(Action::MarkAsRead),
            ActionKind::MarkAsUnread => Ok(Action::MarkAsUnread),
            ActionKind::MoveToInbox => Ok(Action::Move(SystemLabel::Inbox)),
            ActionKind::MoveToSpam => Ok(Action::Move(SystemLabel::Spam)),
            ActionKind::MoveToTrash => Ok(Action::Move(SystemLabel::Trash)),
            ActionKind::Move => {
                let value = spec
                    .parameters
                    .get(LABEL_PARAMETER)
                    .or_else(|| spec.parameters.get("label"))
                    .ok_or_else(|| ActionError::MissingParameter {
                        action: kind.as_str().to_string(),
                        parameter: LABEL_PARAMETER.to_string(),
                    })?;
                let label = value.as_str().ok_or_else(|| ActionError::InvalidParameter {
                    action: kind.as_str().to_string(),
                    parameter: LABEL_PARAMETER.to_string(),
                })?;
                Ok(Action::Move(label.parse()?))
            }
        }
    }

    /// Run the action against the mailbox.
    pub async fn apply(&self, email: &Email, store: &dyn MailStore) -> Result<(), ActionError> {
        debug!(message_id = %email.message_id, action = %self, "Applying action");
        match self {
            Action::MarkAsRead => store.mark_as_read(&email.message_id).await?,
            Action::MarkAsUnread => store.mark_as_unread(&email.message_id).await?,
            Action::Move(label) => store.move_message(&email.message_id, *label).await?,
        }
        Ok(())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MarkAsRead => f.write_str("mark-read"),
            Action::MarkAsUnread => f.write_str("mark-unread"),
            Action::Move(label) => write!(f, "move-to-{}", label.as_str().to_ascii_lowercase()),
        }
    }
}

/// Resolve `spec` and apply it to `email`.
pub async fn apply_action(
    spec: &ActionSpec,
    email: &Email,
    store: &dyn MailStore,
) -> Result<(), ActionError> {
    let action = Action::resolve(spec)?;
    action.apply(email, store).await
}
