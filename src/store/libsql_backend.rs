//! libSQL backend: async `EmailStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::email::Email;
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::EmailStore;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC 3339 first (our canonical write format)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime() output, with or without fractional seconds
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|ndt| ndt.and_utc())
}

/// Map a libsql Row to an Email.
fn row_to_email(row: &libsql::Row) -> Result<Email, DatabaseError> {
    let get = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
    };

    let received_str = get(5)?;
    let received_date = parse_datetime(&received_str).ok_or_else(|| {
        DatabaseError::Query(format!("row parse: bad received_date '{received_str}'"))
    })?;

    Ok(Email {
        message_id: get(0)?,
        sender: get(1)?,
        recipient: get(2)?,
        subject: get(3)?,
        body: get(4)?,
        received_date,
    })
}

/// Classify an insert/update failure.
fn write_error(op: &str, e: libsql::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {message}"))
    } else {
        DatabaseError::Query(format!("{op}: {message}"))
    }
}

// ── Trait implementation ────────────────────────────────────────────

const EMAIL_COLUMNS: &str = "message_id, sender, recipient, subject, body, received_date";

#[async_trait]
impl EmailStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Email>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_by_message_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_email(&row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_by_message_id: {e}"))),
        }
    }

    async fn insert_email(&self, email: &Email) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO emails (id, message_id, sender, recipient, subject, body,
                    received_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                params![
                    id.clone(),
                    email.message_id.as_str(),
                    email.sender.as_str(),
                    email.recipient.as_str(),
                    email.subject.as_str(),
                    email.body.as_str(),
                    email.received_date.to_rfc3339(),
                    now,
                ],
            )
            .await
            .map_err(|e| write_error("insert_email", e))?;

        debug!(id = %id, message_id = %email.message_id, "Email inserted into DB");
        Ok(id)
    }

    async fn list_emails(&self, limit: usize) -> Result<Vec<Email>, DatabaseError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails ORDER BY received_date DESC LIMIT ?1"
                ),
                params![limit],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_emails: {e}")))?;

        let mut emails = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_emails: {e}")))?
        {
            match row_to_email(&row) {
                Ok(email) => emails.push(email),
                Err(e) => tracing::warn!("Skipping email row: {e}"),
            }
        }
        Ok(emails)
    }

    async fn update_email(&self, email: &Email) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute(
                "UPDATE emails SET sender = ?2, recipient = ?3, subject = ?4, body = ?5,
                    received_date = ?6, updated_at = ?7
                 WHERE message_id = ?1",
                params![
                    email.message_id.as_str(),
                    email.sender.as_str(),
                    email.recipient.as_str(),
                    email.subject.as_str(),
                    email.body.as_str(),
                    email.received_date.to_rfc3339(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| write_error("update_email", e))?;
        Ok(count > 0)
    }

    async fn delete_email(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM emails WHERE message_id = ?1", params![message_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_email: {e}")))?;
        Ok(count > 0)
    }
}
