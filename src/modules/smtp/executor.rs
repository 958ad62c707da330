// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::delivery::transport::{EmailTransport, OutboundEmail, TransportError};
use crate::modules::error::MailcastError;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::smtp::client::Sender;
use crate::modules::smtp::manager::{SmtpClientManager, SmtpServerConfig};
use crate::modules::smtp::pool::build_smtp_pool;
use bb8::Pool;
use tracing::debug;

/// Delivers campaign messages through the pooled SMTP relay.
pub struct SmtpTransport {
    pool: Pool<SmtpClientManager>,
}

impl SmtpTransport {
    pub fn new(pool: Pool<SmtpClientManager>) -> Self {
        Self { pool }
    }

    pub fn from_settings() -> Self {
        Self::new(build_smtp_pool(SmtpServerConfig::from_settings(&SETTINGS)))
    }
}

impl EmailTransport for SmtpTransport {
    async fn deliver(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| pool_error(MailcastError::from(e)))?;
        debug!(
            "Sending '{}' to {} recipient(s)",
            email.subject,
            email.destination.recipient_count()
        );
        let message = email
            .to_smtp_message()
            .map_err(|e| TransportError::new(None, format!("failed to render message: {e}")))?;
        client.send_email(message).await.map_err(smtp_error)
    }
}

fn pool_error(error: MailcastError) -> TransportError {
    TransportError::new(Some(format!("{:?}", error.code())), error.to_string())
}

/// Keeps the SMTP reply code so throttling replies (421) can be told apart.
fn smtp_error(error: mail_send::Error) -> TransportError {
    match error {
        mail_send::Error::UnexpectedReply(response)
        | mail_send::Error::AuthenticationFailed(response) => {
            TransportError::new(Some(response.code.to_string()), response.message)
        }
        mail_send::Error::Timeout => TransportError::timeout("SMTP command timed out"),
        mail_send::Error::Io(e) => {
            TransportError::new(Some(format!("{:?}", e.kind())), e.to_string())
        }
        other => TransportError::new(None, other.to_string()),
    }
}
