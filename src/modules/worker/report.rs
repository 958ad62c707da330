// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use tracing::info;

use crate::modules::{delivery::rate::RateStats, metrics::CAMPAIGN_BATCH_DELAY};

/// What the worker decided for one queue message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EntryDisposition {
    Sent,
    /// Counted as failed on the campaign.
    Failed { error_type: String },
    /// Dropped without touching counters: malformed body, unknown campaign
    /// or deleted contact.
    Skipped { reason: String },
    /// Provider asked to slow down; left for queue redelivery.
    Throttled,
    /// Transient errors outlasted the retry budget; left for redelivery.
    RetryLater,
    /// Not started because the invocation deadline was too close.
    Deferred,
}

impl EntryDisposition {
    /// Whether the message can be deleted from the queue.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            EntryDisposition::Sent
                | EntryDisposition::Failed { .. }
                | EntryDisposition::Skipped { .. }
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchSummary {
    pub total_delay_applied: f64,
    pub throttles_detected: u64,
    pub attachment_delays_applied: u64,
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
    pub redelivered: u64,
}

impl BatchSummary {
    pub fn tally(&mut self, disposition: &EntryDisposition) {
        match disposition {
            EntryDisposition::Sent => self.sent += 1,
            EntryDisposition::Failed { .. } => self.failed += 1,
            EntryDisposition::Skipped { .. } => self.skipped += 1,
            EntryDisposition::Throttled
            | EntryDisposition::RetryLater
            | EntryDisposition::Deferred => self.redelivered += 1,
        }
    }

    pub fn absorb_rate_stats(&mut self, stats: &RateStats) {
        self.total_delay_applied = stats.total_delay;
        self.throttles_detected = stats.throttle_count;
        self.attachment_delays_applied = stats.attachment_delay_count;
    }

    pub fn publish(&self) {
        if self.total_delay_applied > 0.0 {
            CAMPAIGN_BATCH_DELAY.inc_by(self.total_delay_applied);
        }
        info!(
            total_delay_applied = self.total_delay_applied,
            throttles_detected = self.throttles_detected,
            attachment_delays_applied = self.attachment_delays_applied,
            sent = self.sent,
            failed = self.failed,
            skipped = self.skipped,
            redelivered = self.redelivered,
            "Batch finished"
        );
    }
}

/// Outcome of one invocation: receipts to acknowledge and receipts the
/// queue should hand out again.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub acked: Vec<String>,
    pub redeliver: Vec<String>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn record(&mut self, receipt: String, disposition: &EntryDisposition) {
        self.summary.tally(disposition);
        if disposition.is_settled() {
            self.acked.push(receipt);
        } else {
            self.redeliver.push(receipt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_settled_entries_are_acknowledged() {
        let mut report = BatchReport::default();
        report.record("r1".into(), &EntryDisposition::Sent);
        report.record(
            "r2".into(),
            &EntryDisposition::Failed {
                error_type: "MessageRejected".into(),
            },
        );
        report.record(
            "r3".into(),
            &EntryDisposition::Skipped {
                reason: "contact deleted".into(),
            },
        );
        report.record("r4".into(), &EntryDisposition::Throttled);
        report.record("r5".into(), &EntryDisposition::RetryLater);
        report.record("r6".into(), &EntryDisposition::Deferred);

        assert_eq!(report.acked, vec!["r1", "r2", "r3"]);
        assert_eq!(report.redeliver, vec!["r4", "r5", "r6"]);
        assert_eq!(report.summary.sent, 1);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.redelivered, 3);
    }
}
