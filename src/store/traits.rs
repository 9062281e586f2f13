//! `EmailStore` trait: async persistence interface for fetched emails.

use async_trait::async_trait;

use crate::email::Email;
use crate::error::DatabaseError;

/// Durable record of every email the pipeline has seen.
///
/// `message_id` is unique: inserting an id that already exists is a
/// [`DatabaseError::Constraint`].
#[async_trait]
pub trait EmailStore: Send + Sync {
    /// Create tables and apply pending migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Email>, DatabaseError>;

    /// Persist a new email. Returns the generated row id.
    async fn insert_email(&self, email: &Email) -> Result<String, DatabaseError>;

    /// Most recently received first.
    async fn list_emails(&self, limit: usize) -> Result<Vec<Email>, DatabaseError>;

    /// Overwrite the stored fields of the email with the same message id.
    /// Returns `false` when no such email exists.
    async fn update_email(&self, email: &Email) -> Result<bool, DatabaseError>;

    /// Returns `false` when no such email exists.
    async fn delete_email(&self, message_id: &str) -> Result<bool, DatabaseError>;
}
