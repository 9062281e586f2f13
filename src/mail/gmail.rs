//! Gmail REST v1 adapter for [`MailStore`].
//!
//! Messages are listed, then fetched one by one in `raw` format and parsed
//! locally. Label changes go through the `modify` endpoint.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{MailStore, SystemLabel};
use crate::email::Email;
use crate::error::MailStoreError;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const DEFAULT_USER_ID: &str = "me";

const UNREAD_LABEL: &str = "UNREAD";

// ── API payloads ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    #[serde(default)]
    raw: Option<String>,
    /// Milliseconds since the epoch, as a decimal string.
    #[serde(default)]
    internal_date: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_label_ids: Vec<String>,
}

impl ModifyRequest {
    fn move_to(label: SystemLabel) -> Self {
        Self {
            add_label_ids: vec![label.as_str().to_string()],
            remove_label_ids: label.others().iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

// ── Adapter ────────────────────────────────────────────────────────

/// Connection settings for the Gmail API.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub user_id: String,
    pub access_token: SecretString,
}

impl GmailConfig {
    pub fn new(access_token: SecretString) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            access_token,
        }
    }
}

pub struct GmailMailStore {
    client: reqwest::Client,
    config: GmailConfig,
}

impl GmailMailStore {
    pub fn new(config: GmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/users/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id
        )
    }

    async fn modify(&self, message_id: &str, request: ModifyRequest) -> Result<(), MailStoreError> {
        let url = format!("{}/{}/modify", self.messages_url(), message_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(&request)
            .send()
            .await?;
        check_status(resp, message_id).await?;
        debug!(
            message_id,
            add = ?request.add_label_ids,
            remove = ?request.remove_label_ids,
            "Labels modified"
        );
        Ok(())
    }
}

#[async_trait]
impl MailStore for GmailMailStore {
    async fn fetch_batch(&self, max_count: usize) -> Result<Vec<Email>, MailStoreError> {
        let resp = self
            .client
            .get(self.messages_url())
            .bearer_auth(self.config.access_token.expose_secret())
            .query(&[("maxResults", max_count.to_string())])
            .send()
            .await?;
        let list: MessageListResponse = check_status(resp, "").await?.json().await?;

        let mut emails = Vec::with_capacity(list.messages.len());
        for stub in &list.messages {
            match self.get_email(&stub.id).await {
                Ok(email) => emails.push(email),
                Err(e) if is_per_message(&e) => {
                    warn!(message_id = %stub.id, error = %e, "Skipping message");
                }
                Err(e) => return Err(e),
            }
        }

        info!(listed = list.messages.len(), fetched = emails.len(), "Fetched mailbox batch");
        Ok(emails)
    }

    async fn get_email(&self, message_id: &str) -> Result<Email, MailStoreError> {
        let url = format!("{}/{}", self.messages_url(), message_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .query(&[("format", "raw")])
            .send()
            .await?;
        let message: RawMessage = check_status(resp, message_id).await?.json().await?;
        parse_raw_message(&message)
    }

    async fn mark_as_read(&self, message_id: &str) -> Result<(), MailStoreError> {
        let request = ModifyRequest {
            remove_label_ids: vec![UNREAD_LABEL.to_string()],
            ..Default::default()
        };
        self.modify(message_id, request).await
    }

    async fn mark_as_unread(&self, message_id: &str) -> Result<(), MailStoreError> {
        let request = ModifyRequest {
            add_label_ids: vec![UNREAD_LABEL.to_string()],
            ..Default::default()
        };
        self.modify(message_id, request).await
    }

    async fn move_message(&self, message_id: &str, label: SystemLabel) -> Result<(), MailStoreError> {
        self.modify(message_id, ModifyRequest::move_to(label)).await
    }
}

// ── Helpers ────────────────────────────────────────────────────────

async fn check_status(
    resp: reqwest::Response,
    message_id: &str,
) -> Result<reqwest::Response, MailStoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), message_id, body))
}

fn status_error(status: u16, message_id: &str, body: String) -> MailStoreError {
    match status {
        401 => MailStoreError::AuthExpired,
        404 if !message_id.is_empty() => MailStoreError::NotFound(message_id.to_string()),
        _ => MailStoreError::Api {
            status,
            message: body,
        },
    }
}

/// Errors that concern a single message and leave the rest of a batch usable.
fn is_per_message(err: &MailStoreError) -> bool {
    matches!(
        err,
        MailStoreError::NotFound(_) | MailStoreError::MalformedMessage { .. }
    )
}

/// Decode and parse a `format=raw` message.
fn parse_raw_message(message: &RawMessage) -> Result<Email, MailStoreError> {
    let malformed = |reason: &str| MailStoreError::MalformedMessage {
        id: message.id.clone(),
        reason: reason.to_string(),
    };

    let raw = message.raw.as_deref().ok_or_else(|| malformed("missing raw payload"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(raw.trim_end_matches('='))
        .map_err(|e| malformed(&format!("invalid base64: {e}")))?;
    let parsed = MessageParser::default()
        .parse(&bytes)
        .ok_or_else(|| malformed("not an RFC 5322 message"))?;

    let received_date = parsed
        .date()
        .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0))
        .or_else(|| {
            message
                .internal_date
                .as_deref()
                .and_then(|ms| ms.parse::<i64>().ok())
                .and_then(DateTime::<Utc>::from_timestamp_millis)
        })
        .ok_or_else(|| malformed("no usable date"))?;

    let body = parsed
        .body_text(0)
        .or_else(|| parsed.body_html(0))
        .map(|b| b.into_owned())
        .unwrap_or_default();

    Ok(Email::new(
        message.id.clone(),
        first_address(parsed.from()),
        first_address(parsed.to()),
        parsed.subject().unwrap_or_default(),
        body,
        received_date,
    ))
}

fn first_address(address: Option<&Address<'_>>) -> String {
    address
        .and_then(|a| a.first())
        .and_then(|addr| addr.address().or(addr.name()))
        .unwrap_or_default()
        .to_string()
}
