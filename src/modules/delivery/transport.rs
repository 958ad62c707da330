// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use mail_send::{
    mail_builder::{headers::address::Address, MessageBuilder},
    smtp::message::Message,
};
use tracing::debug;

use crate::modules::{
    campaign::entity::{Attachment, CampaignEntity},
    delivery::{
        attachment::AttachmentStore,
        classifier::ErrorClass,
        personalize::Personalizer,
        rate::RateController,
        recipient::Destination,
    },
    metrics::{CAMPAIGN_ATTACHMENT_BYTES, CAMPAIGN_SEND_DURATION},
};

/// Failure reported by an email transport.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TransportError {
    /// Provider or SMTP reply code, when the transport exposes one.
    pub code: Option<String>,
    pub message: String,
    pub timed_out: bool,
}

impl TransportError {
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            timed_out: true,
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundAttachment {
    pub filename: String,
    pub content_type: String,
    pub inline: bool,
    pub content: Vec<u8>,
}

/// A fully personalized message ready for the transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutboundEmail {
    pub from: String,
    pub destination: Destination,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<OutboundAttachment>,
}

impl OutboundEmail {
    fn address(list: &[String]) -> Address<'static> {
        if list.len() == 1 {
            Address::from(list[0].clone())
        } else {
            Address::new_list(list.iter().cloned().map(Address::from).collect())
        }
    }

    /// Simple HTML message, or multipart when attachments are present.
    /// Inline parts use the file name as content id. Bcc recipients never
    /// appear in the headers, they only travel in the envelope.
    pub fn to_message_builder(&self) -> MessageBuilder<'static> {
        let mut builder = MessageBuilder::new()
            .from(self.from.clone())
            .to(Self::address(&self.destination.to))
            .subject(self.subject.clone())
            .html_body(self.html_body.clone());
        if !self.destination.cc.is_empty() {
            builder = builder.cc(Self::address(&self.destination.cc));
        }
        for attachment in &self.attachments {
            builder = if attachment.inline {
                builder.inline(
                    attachment.content_type.clone(),
                    attachment.filename.clone(),
                    attachment.content.clone(),
                )
            } else {
                builder.attachment(
                    attachment.content_type.clone(),
                    attachment.filename.clone(),
                    attachment.content.clone(),
                )
            };
        }
        builder
    }

    /// Every RCPT TO address: the visible To and Cc lists plus Bcc.
    pub fn envelope_recipients(&self) -> Vec<String> {
        self.destination
            .to
            .iter()
            .chain(&self.destination.cc)
            .chain(&self.destination.bcc)
            .cloned()
            .collect()
    }

    /// Rendered body with an explicit envelope, so Bcc delivery does not
    /// depend on the header set.
    pub fn to_smtp_message(&self) -> std::io::Result<Message<'static>> {
        let body = self.to_message_builder().write_to_vec()?;
        let mut message = Message::empty();
        message = message.body(body);
        message = message.from(self.from.clone());
        for recip in self.envelope_recipients() {
            message = message.to(recip);
        }
        Ok(message)
    }

    pub fn attachment_bytes(&self) -> u64 {
        self.attachments.iter().map(|a| a.content.len() as u64).sum()
    }
}

pub trait EmailTransport {
    fn deliver(
        &self,
        email: &OutboundEmail,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    Success,
    Throttled(TransportError),
    /// Worth retrying on the spot (timeouts, dropped connections).
    Transient(TransportError),
    /// Not retried. `error_type` labels the validation metric.
    PermanentFailure {
        error_type: &'static str,
        reason: String,
    },
}

impl SendOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Success => "success",
            SendOutcome::Throttled(_) => "throttled",
            SendOutcome::Transient(_) => "transient",
            SendOutcome::PermanentFailure { .. } => "failed",
        }
    }
}

/// One per send attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct SendEvent {
    pub latency: Duration,
    pub outcome: &'static str,
    pub attachment_bytes: u64,
}

impl SendEvent {
    pub fn observe(&self) {
        CAMPAIGN_SEND_DURATION
            .with_label_values(&[self.outcome])
            .observe(self.latency.as_secs_f64());
        if self.attachment_bytes > 0 {
            CAMPAIGN_ATTACHMENT_BYTES.inc_by(self.attachment_bytes);
        }
        debug!(
            "Send finished: outcome={}, latency={:?}, attachment_bytes={}",
            self.outcome, self.latency, self.attachment_bytes
        );
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SendReport {
    pub outcome: SendOutcome,
    pub event: SendEvent,
}

pub struct TransportAdapter<T, A> {
    transport: Arc<T>,
    attachments: Arc<A>,
    personalizer: Personalizer,
}

impl<T, A> TransportAdapter<T, A>
where
    T: EmailTransport + Send + Sync,
    A: AttachmentStore + Send + Sync,
{
    pub fn new(transport: Arc<T>, attachments: Arc<A>) -> Self {
        Self {
            transport,
            attachments,
            personalizer: Personalizer::new(),
        }
    }

    /// Personalizes, fetches attachments and issues exactly one transport call.
    /// Transport errors are classified by the rate controller's classifier.
    pub async fn send(
        &self,
        destination: &Destination,
        campaign: &CampaignEntity,
        contact_address: &str,
        fields: &BTreeMap<String, String>,
        rate: &RateController,
    ) -> SendReport {
        let started = Instant::now();
        let report = |outcome: SendOutcome, attachment_bytes: u64| SendReport {
            event: SendEvent {
                latency: started.elapsed(),
                outcome: outcome.label(),
                attachment_bytes,
            },
            outcome,
        };

        let content = match self.personalizer.render(
            &campaign.subject_template,
            &campaign.body_template,
            contact_address,
            fields,
        ) {
            Ok(content) => content,
            Err(e) => {
                return report(
                    SendOutcome::PermanentFailure {
                        error_type: "TemplateRenderFailed",
                        reason: e.to_string(),
                    },
                    0,
                )
            }
        };

        let attachments = match self.fetch_attachments(&campaign.attachments).await {
            Ok(attachments) => attachments,
            Err(reason) => {
                return report(
                    SendOutcome::PermanentFailure {
                        error_type: "AttachmentFetchFailed",
                        reason,
                    },
                    0,
                )
            }
        };

        let email = OutboundEmail {
            from: campaign.sender_address.clone(),
            destination: destination.clone(),
            subject: content.subject,
            html_body: content.html_body,
            attachments,
        };
        let attachment_bytes = email.attachment_bytes();

        let outcome = match self.transport.deliver(&email).await {
            Ok(()) => SendOutcome::Success,
            Err(error) => match rate.classify(&error) {
                ErrorClass::Throttle => SendOutcome::Throttled(error),
                ErrorClass::Transient => SendOutcome::Transient(error),
                ErrorClass::Permanent => SendOutcome::PermanentFailure {
                    error_type: "MessageRejected",
                    reason: error.to_string(),
                },
            },
        };
        report(outcome, attachment_bytes)
    }

    /// All or nothing: the first failing reference aborts the send.
    async fn fetch_attachments(
        &self,
        attachments: &[Attachment],
    ) -> Result<Vec<OutboundAttachment>, String> {
        let mut fetched = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let content = self
                .attachments
                .fetch(&attachment.storage_reference)
                .await
                .map_err(|e| {
                    format!(
                        "Attachment '{}' ({}) could not be fetched: {}",
                        attachment.filename, attachment.storage_reference, e
                    )
                })?;
            let content_type = attachment.content_type.clone().unwrap_or_else(|| {
                mime_guess::from_path(&attachment.filename)
                    .first_or_octet_stream()
                    .to_string()
            });
            fetched.push(OutboundAttachment {
                filename: attachment.filename.clone(),
                content_type,
                inline: attachment.inline,
                content,
            });
        }
        Ok(fetched)
    }
}
