// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{fmt, future::Future, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    modules::error::{code::ErrorCode, MailcastResult},
    raise_error,
};

pub mod native;

/// How the contact of a queue entry is addressed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipientRole {
    #[default]
    Primary,
    Cc,
    Bcc,
}

impl RecipientRole {
    pub fn is_primary(&self) -> bool {
        matches!(self, RecipientRole::Primary)
    }
}

impl fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipientRole::Primary => write!(f, "primary"),
            RecipientRole::Cc => write!(f, "cc"),
            RecipientRole::Bcc => write!(f, "bcc"),
        }
    }
}

/// One recipient of one campaign, as written by the producer.
///
/// Wire form: `{"campaign_id": "...", "contact_email": "...", "role": "cc"|"bcc"}`
/// where a missing `role` means primary.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub campaign_id: String,
    pub contact_email: String,
    #[serde(default, skip_serializing_if = "RecipientRole::is_primary")]
    pub role: RecipientRole,
}

impl QueueEntry {
    pub fn new(
        campaign_id: impl Into<String>,
        contact_email: impl Into<String>,
        role: RecipientRole,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            contact_email: contact_email.into(),
            role,
        }
    }

    pub fn parse(body: &str) -> MailcastResult<Self> {
        let entry: QueueEntry = serde_json::from_str(body).map_err(|e| {
            raise_error!(
                format!("Malformed queue message: {}", e),
                ErrorCode::MalformedQueueMessage
            )
        })?;
        if entry.campaign_id.trim().is_empty() {
            return Err(raise_error!(
                "Queue message has an empty campaign_id".into(),
                ErrorCode::MalformedQueueMessage
            ));
        }
        Ok(entry)
    }

    pub fn to_json(&self) -> MailcastResult<String> {
        serde_json::to_string(self)
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))
    }
}

/// A message handed out by the queue. It stays invisible to other
/// receivers until acknowledged or until its visibility timeout expires.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedMessage {
    pub receipt: String,
    pub receive_count: u32,
    pub body: String,
}

pub trait QueueSource {
    /// Receives up to `max` visible messages and hides them for `visibility_timeout`.
    fn receive(
        &self,
        max: usize,
        visibility_timeout: Duration,
    ) -> impl Future<Output = MailcastResult<Vec<ReceivedMessage>>> + Send;

    /// Deletes acknowledged messages. Unknown or stale receipts are ignored.
    fn acknowledge(
        &self,
        receipts: Vec<String>,
    ) -> impl Future<Output = MailcastResult<usize>> + Send;

    fn send(&self, entries: Vec<QueueEntry>) -> impl Future<Output = MailcastResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_role_means_primary() {
        let entry =
            QueueEntry::parse(r#"{"campaign_id":"c1","contact_email":"a@example.com"}"#).unwrap();
        assert_eq!(entry.role, RecipientRole::Primary);

        let entry = QueueEntry::parse(
            r#"{"campaign_id":"c1","contact_email":"a@example.com","role":"bcc"}"#,
        )
        .unwrap();
        assert_eq!(entry.role, RecipientRole::Bcc);
    }

    #[test]
    fn primary_role_is_not_serialized() {
        let json = QueueEntry::new("c1", "a@example.com", RecipientRole::Primary)
            .to_json()
            .unwrap();
        assert!(!json.contains("role"));
        let json = QueueEntry::new("c1", "a@example.com", RecipientRole::Cc)
            .to_json()
            .unwrap();
        assert!(json.contains(r#""role":"cc""#));
    }

    #[test]
    fn malformed_messages_are_rejected() {
        for body in [
            "not json",
            r#"{"contact_email":"a@example.com"}"#,
            r#"{"campaign_id":"c1","contact_email":"a@example.com","role":"to"}"#,
            r#"{"campaign_id":" ","contact_email":"a@example.com"}"#,
        ] {
            let err = QueueEntry::parse(body).unwrap_err();
            assert_eq!(err.code(), ErrorCode::MalformedQueueMessage);
        }
    }
}
