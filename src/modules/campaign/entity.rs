// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

use crate::utc_now;

/// Lifecycle of a campaign. Declaration order is the only allowed direction.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum CampaignStatus {
    #[default]
    Queued,
    Processing,
    Sending,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Queued => "queued",
            CampaignStatus::Processing => "processing",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Completed => "completed",
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name presented to the recipient.
    pub filename: String,
    /// Size in bytes as recorded when the campaign was created.
    pub size_bytes: u64,
    /// Opaque key understood by the attachment store.
    pub storage_reference: String,
    /// Inline parts are referenced from the HTML body by `cid:<filename>`.
    pub inline: bool,
    /// MIME type; guessed from the file name when absent.
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 1, version = 1)]
#[native_db]
pub struct CampaignEntity {
    #[primary_key]
    pub campaign_id: String,
    /// Handlebars template for the subject line.
    pub subject_template: String,
    /// Handlebars template for the HTML body.
    pub body_template: String,
    /// Used as the `From` address and as the `To` address of cc/bcc copies.
    pub sender_address: String,
    /// Name of the transport profile; `None` selects the default transport.
    pub transport_config_ref: Option<String>,
    pub attachments: Vec<Attachment>,
    pub cc_list: Vec<String>,
    pub bcc_list: Vec<String>,
    /// Number of queue entries the producer enqueued for this campaign.
    pub queued_count: u64,
    pub sent_count: u64,
    pub failed_count: u64,
    pub status: CampaignStatus,
    /// Timestamp (Unix epoch milliseconds) when the campaign was created.
    pub created_at: i64,
    /// Timestamp (Unix epoch milliseconds) of the first successful send.
    pub start_time: Option<i64>,
    /// Timestamp (Unix epoch milliseconds) when the campaign completed. Written once.
    pub completed_at: Option<i64>,
}

impl CampaignEntity {
    pub fn new(
        campaign_id: impl Into<String>,
        subject_template: impl Into<String>,
        body_template: impl Into<String>,
        sender_address: impl Into<String>,
        queued_count: u64,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            subject_template: subject_template.into(),
            body_template: body_template.into(),
            sender_address: sender_address.into(),
            queued_count,
            created_at: utc_now!(),
            ..Default::default()
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.sent_count.saturating_add(self.failed_count)
    }

    /// Redelivery can over-count, so completion is "seen enough outcomes".
    pub fn has_seen_all_outcomes(&self) -> bool {
        self.queued_count > 0 && self.processed_count() >= self.queued_count
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.queued_count == 0 {
            return 0.0;
        }
        let pct = self.processed_count() as f64 * 100.0 / self.queued_count as f64;
        pct.min(100.0)
    }

    /// Moves the status forward. Returns `false` when `to` is not ahead of the current status.
    pub fn advance_to(&mut self, to: CampaignStatus) -> bool {
        if to <= self.status {
            return false;
        }
        self.status = to;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        let mut campaign = CampaignEntity::new("c1", "s", "b", "news@example.com", 3);
        assert!(campaign.advance_to(CampaignStatus::Sending));
        assert!(!campaign.advance_to(CampaignStatus::Processing));
        assert!(!campaign.advance_to(CampaignStatus::Sending));
        assert_eq!(campaign.status, CampaignStatus::Sending);
        assert!(campaign.advance_to(CampaignStatus::Completed));
        assert!(!campaign.advance_to(CampaignStatus::Queued));
    }

    #[test]
    fn completion_uses_greater_or_equal_threshold() {
        let mut campaign = CampaignEntity::new("c1", "s", "b", "news@example.com", 3);
        campaign.sent_count = 2;
        assert!(!campaign.has_seen_all_outcomes());
        campaign.failed_count = 2;
        assert!(campaign.has_seen_all_outcomes());
        assert_eq!(campaign.completion_percentage(), 100.0);

        let empty = CampaignEntity::new("c2", "s", "b", "news@example.com", 0);
        assert!(!empty.has_seen_all_outcomes());
    }
}
