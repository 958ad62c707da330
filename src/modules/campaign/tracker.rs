// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    modules::{
        campaign::{
            entity::{CampaignEntity, CampaignStatus},
            store::CampaignStore,
        },
        database::UpdateOutcome,
        metrics::CAMPAIGN_INCOMPLETE_COMPLETION,
    },
    utc_now,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Sent,
    Failed,
}

/// Emitted once, by the call that moved a campaign to `completed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionTransition {
    pub campaign_id: String,
    pub completed_at: i64,
    pub sent_count: u64,
    pub failed_count: u64,
    pub queued_count: u64,
}

/// Counter and lifecycle bookkeeping for campaigns. Every mutation is a
/// single conditional update in the store; failures are logged and never
/// change the outcome of the send that triggered them.
pub struct CampaignTracker<S> {
    store: Arc<S>,
}

impl<S> Clone for CampaignTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: CampaignStore + Send + Sync> CampaignTracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Increment-if-exists. Returns the updated row, or `None` when the
    /// campaign is gone or the store failed.
    pub async fn record_outcome(
        &self,
        campaign_id: &str,
        outcome: Outcome,
    ) -> Option<CampaignEntity> {
        let result = self
            .store
            .update_campaign_if(campaign_id, move |current| {
                let mut next = current.clone();
                match outcome {
                    Outcome::Sent => next.sent_count = next.sent_count.saturating_add(1),
                    Outcome::Failed => next.failed_count = next.failed_count.saturating_add(1),
                }
                Some(next)
            })
            .await;

        match result {
            Ok(UpdateOutcome::Updated { after, .. }) => Some(after),
            Ok(UpdateOutcome::Missing) => {
                warn!(
                    "Counter update skipped, campaign '{}' no longer exists (outcome: {:?})",
                    campaign_id, outcome
                );
                None
            }
            Ok(UpdateOutcome::Unchanged(_)) => None,
            Err(e) => {
                error!(
                    "Failed to record {:?} for campaign '{}': {:#?}",
                    outcome, campaign_id, e
                );
                None
            }
        }
    }

    /// Moves the campaign to `completed` when enough outcomes were seen.
    /// The write is guarded by `status != completed`, so only one caller
    /// ever gets `Some`.
    pub async fn check_completion(&self, campaign_id: &str) -> Option<CompletionTransition> {
        let campaign = match self.store.find_campaign(campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                debug!("Completion check skipped, campaign '{}' not found", campaign_id);
                return None;
            }
            Err(e) => {
                error!(
                    "Failed to load campaign '{}' for completion check: {:#?}",
                    campaign_id, e
                );
                return None;
            }
        };

        if campaign.status == CampaignStatus::Completed {
            return None;
        }

        if !campaign.has_seen_all_outcomes() {
            CAMPAIGN_INCOMPLETE_COMPLETION
                .with_label_values(&[campaign_id])
                .set(campaign.completion_percentage());
            return None;
        }

        let now = utc_now!();
        let result = self
            .store
            .update_campaign_if(campaign_id, move |current| {
                if current.status == CampaignStatus::Completed || !current.has_seen_all_outcomes()
                {
                    return None;
                }
                let mut next = current.clone();
                next.advance_to(CampaignStatus::Completed);
                if next.completed_at.is_none() {
                    next.completed_at = Some(now);
                }
                Some(next)
            })
            .await;

        match result {
            Ok(UpdateOutcome::Updated { after, .. }) => {
                let _ = CAMPAIGN_INCOMPLETE_COMPLETION.remove_label_values(&[campaign_id]);
                info!(
                    "Campaign '{}' completed: sent={}, failed={}, queued={}",
                    campaign_id, after.sent_count, after.failed_count, after.queued_count
                );
                Some(CompletionTransition {
                    campaign_id: after.campaign_id,
                    completed_at: after.completed_at.unwrap_or(now),
                    sent_count: after.sent_count,
                    failed_count: after.failed_count,
                    queued_count: after.queued_count,
                })
            }
            Ok(UpdateOutcome::Unchanged(_)) | Ok(UpdateOutcome::Missing) => None,
            Err(e) => {
                error!("Failed to complete campaign '{}': {:#?}", campaign_id, e);
                None
            }
        }
    }

    /// Sets `start_time` if absent and moves `queued|processing` to `sending`.
    pub async fn record_first_send(&self, campaign_id: &str) {
        let now = utc_now!();
        let result = self
            .store
            .update_campaign_if(campaign_id, move |current| {
                let mut next = current.clone();
                let started = next.start_time.is_none();
                if started {
                    next.start_time = Some(now);
                }
                let advanced = next.advance_to(CampaignStatus::Sending);
                (started || advanced).then_some(next)
            })
            .await;

        match result {
            Ok(UpdateOutcome::Updated { before, after }) => {
                if before.start_time.is_none() {
                    info!(
                        "Campaign '{}' started sending (status: {})",
                        campaign_id,
                        after.status.as_str()
                    );
                }
            }
            Ok(_) => {}
            Err(e) => error!(
                "Failed to record first send for campaign '{}': {:#?}",
                campaign_id, e
            ),
        }
    }

    /// `queued -> processing` when a worker first picks the campaign up.
    pub async fn mark_processing(&self, campaign_id: &str) {
        let result = self
            .store
            .update_campaign_if(campaign_id, |current| {
                if current.status != CampaignStatus::Queued {
                    return None;
                }
                let mut next = current.clone();
                next.advance_to(CampaignStatus::Processing);
                Some(next)
            })
            .await;

        if let Err(e) = result {
            error!(
                "Failed to mark campaign '{}' as processing: {:#?}",
                campaign_id, e
            );
        }
    }
}
