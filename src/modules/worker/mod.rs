// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use crate::modules::{
    campaign::{
        entity::{CampaignEntity, CampaignStatus},
        store::{CampaignStore, ContactStore},
        tracker::{CampaignTracker, Outcome},
    },
    delivery::{
        attachment::AttachmentStore,
        rate::RateController,
        recipient::RecipientResolver,
        transport::{EmailTransport, SendOutcome, TransportAdapter},
    },
    metrics::{
        CAMPAIGN_ATTACHMENT_DELAYS, CAMPAIGN_EMAILS_FAILED, CAMPAIGN_EMAILS_PROCESSED,
        CAMPAIGN_THROTTLE_EXCEPTIONS, CAMPAIGN_VALIDATION_ERRORS,
    },
    queue::{QueueEntry, ReceivedMessage},
    settings::cli::Settings,
};

pub mod report;
pub mod runner;

use report::{BatchReport, EntryDisposition};

#[derive(Clone, Debug, PartialEq)]
pub struct WorkerOptions {
    /// No new entry is started once less than this is left before the deadline.
    pub drain_margin: Duration,
    pub transport_retry_attempts: u32,
    pub transport_retry_pause: Duration,
}

impl WorkerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            drain_margin: Duration::from_secs(settings.mailcast_drain_margin_seconds),
            transport_retry_attempts: settings.mailcast_transport_retry_attempts,
            transport_retry_pause: Duration::from_millis(
                settings.mailcast_transport_retry_pause_ms,
            ),
        }
    }
}

/// Processes queue batches one entry at a time. The rate controller is owned
/// by the caller and lives for exactly one invocation.
pub struct CampaignWorker<S, T, A> {
    store: Arc<S>,
    tracker: CampaignTracker<S>,
    adapter: TransportAdapter<T, A>,
    options: WorkerOptions,
}

impl<S, T, A> CampaignWorker<S, T, A>
where
    S: CampaignStore + ContactStore + Send + Sync,
    T: EmailTransport + Send + Sync,
    A: AttachmentStore + Send + Sync,
{
    pub fn new(
        store: Arc<S>,
        transport: Arc<T>,
        attachments: Arc<A>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            tracker: CampaignTracker::new(store.clone()),
            store,
            adapter: TransportAdapter::new(transport, attachments),
            options,
        }
    }

    pub async fn run_invocation(
        &self,
        messages: Vec<ReceivedMessage>,
        rate: &mut RateController,
        deadline: Instant,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let mut draining = false;
        for message in messages {
            if !draining
                && deadline.saturating_duration_since(Instant::now()) < self.options.drain_margin
            {
                warn!("Invocation deadline is near, remaining entries are left for redelivery");
                draining = true;
            }
            let disposition = if draining {
                EntryDisposition::Deferred
            } else {
                self.process(&message, rate, deadline).await
            };
            debug!("Queue message {} -> {:?}", message.receipt, disposition);
            report.record(message.receipt, &disposition);
        }
        report.summary.absorb_rate_stats(&rate.stats());
        report.summary.publish();
        report
    }

    async fn process(
        &self,
        message: &ReceivedMessage,
        rate: &mut RateController,
        deadline: Instant,
    ) -> EntryDisposition {
        let entry = match QueueEntry::parse(&message.body) {
            Ok(entry) => entry,
            Err(e) => {
                error!("Dropping queue message {}: {}", message.receipt, e.message());
                return EntryDisposition::Skipped {
                    reason: e.message().to_string(),
                };
            }
        };

        let campaign = match self.store.find_campaign(&entry.campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => {
                warn!(
                    "Campaign '{}' not found, dropping entry for {}",
                    entry.campaign_id, entry.contact_email
                );
                return EntryDisposition::Skipped {
                    reason: "campaign not found".into(),
                };
            }
            Err(e) => {
                error!("Failed to load campaign '{}': {:#?}", entry.campaign_id, e);
                return EntryDisposition::RetryLater;
            }
        };
        if campaign.status == CampaignStatus::Queued {
            self.tracker.mark_processing(&campaign.campaign_id).await;
        }

        let fields = match self.store.find_contact(&entry.contact_email).await {
            Ok(Some(contact)) => contact.personalization_fields,
            Ok(None) if entry.role.is_primary() => {
                info!(
                    "Contact {} no longer exists, skipping campaign '{}'",
                    entry.contact_email, entry.campaign_id
                );
                return EntryDisposition::Skipped {
                    reason: "contact not found".into(),
                };
            }
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                error!("Failed to load contact {}: {:#?}", entry.contact_email, e);
                return EntryDisposition::RetryLater;
            }
        };

        if entry.role.is_primary() {
            if let Some(listed) = RecipientResolver::listed_role(&entry.contact_email, &campaign) {
                warn!(
                    "{} is a primary recipient of campaign '{}' and also listed as {}",
                    entry.contact_email, campaign.campaign_id, listed
                );
                CAMPAIGN_VALIDATION_ERRORS
                    .with_label_values(&["RecipientRoleOverlap"])
                    .inc();
            }
        }

        let destination =
            match RecipientResolver::resolve(entry.role, &entry.contact_email, &campaign) {
                Ok(destination) => destination,
                Err(e) => {
                    error!(
                        "Campaign '{}', role {}: {}",
                        campaign.campaign_id,
                        entry.role,
                        e.message()
                    );
                    return self.fail(&campaign.campaign_id, "NoPrimaryRecipient").await;
                }
            };

        self.pace(rate, &campaign, deadline).await;

        let mut attempt = 0;
        loop {
            let report = self
                .adapter
                .send(&destination, &campaign, &entry.contact_email, &fields, rate)
                .await;
            report.event.observe();
            match report.outcome {
                SendOutcome::Success => {
                    CAMPAIGN_EMAILS_PROCESSED.inc();
                    self.tracker
                        .record_outcome(&campaign.campaign_id, Outcome::Sent)
                        .await;
                    self.tracker.record_first_send(&campaign.campaign_id).await;
                    self.tracker.check_completion(&campaign.campaign_id).await;
                    return EntryDisposition::Sent;
                }
                SendOutcome::Throttled(error) => {
                    CAMPAIGN_THROTTLE_EXCEPTIONS.inc();
                    warn!(
                        "Throttled while sending campaign '{}' to {}: {}",
                        campaign.campaign_id, entry.contact_email, error
                    );
                    rate.on_throttle_detected();
                    return EntryDisposition::Throttled;
                }
                SendOutcome::PermanentFailure { error_type, reason } => {
                    warn!(
                        "Campaign '{}' to {} failed ({}): {}",
                        campaign.campaign_id, entry.contact_email, error_type, reason
                    );
                    return self.fail(&campaign.campaign_id, error_type).await;
                }
                SendOutcome::Transient(error) => {
                    let pause = self.options.transport_retry_pause;
                    if attempt >= self.options.transport_retry_attempts
                        || Instant::now() + pause >= deadline
                    {
                        warn!(
                            "Giving up on {} for campaign '{}' after {} attempt(s): {}",
                            entry.contact_email,
                            campaign.campaign_id,
                            attempt + 1,
                            error
                        );
                        return EntryDisposition::RetryLater;
                    }
                    attempt += 1;
                    debug!(
                        "Transient error for {}, retry {}/{}: {}",
                        entry.contact_email, attempt, self.options.transport_retry_attempts, error
                    );
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Sleeps for the controller's delay, cut short by the deadline.
    async fn pace(&self, rate: &mut RateController, campaign: &CampaignEntity, deadline: Instant) {
        rate.maybe_recover();
        let attachment_delays = rate.stats().attachment_delay_count;
        let delay = rate.next_delay(&campaign.attachments);
        if rate.stats().attachment_delay_count > attachment_delays {
            CAMPAIGN_ATTACHMENT_DELAYS.inc();
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        let pause = Duration::from_secs_f64(delay.max(0.0)).min(remaining);
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        rate.record_applied_delay(pause.as_secs_f64());
    }

    async fn fail(&self, campaign_id: &str, error_type: &str) -> EntryDisposition {
        CAMPAIGN_EMAILS_FAILED.inc();
        CAMPAIGN_VALIDATION_ERRORS
            .with_label_values(&[error_type])
            .inc();
        self.tracker
            .record_outcome(campaign_id, Outcome::Failed)
            .await;
        self.tracker.check_completion(campaign_id).await;
        EntryDisposition::Failed {
            error_type: error_type.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{
        campaign::{contact::ContactEntity, entity::Attachment, store::NativeCampaignStore},
        database::manager::in_memory_campaign_db,
        delivery::{
            classifier::PatternClassifier,
            rate::{RateControlConfig, MB},
            transport::{
                tests::{MemoryAttachments, ScriptedTransport},
                TransportError,
            },
        },
        queue::RecipientRole,
    };

    type TestWorker = CampaignWorker<NativeCampaignStore, ScriptedTransport, MemoryAttachments>;

    struct Harness {
        store: Arc<NativeCampaignStore>,
        transport: Arc<ScriptedTransport>,
        attachments: Arc<MemoryAttachments>,
        worker: TestWorker,
    }

    fn options(transport_retry_attempts: u32) -> WorkerOptions {
        WorkerOptions {
            drain_margin: Duration::from_millis(50),
            transport_retry_attempts,
            transport_retry_pause: Duration::ZERO,
        }
    }

    fn harness(script: Vec<Result<(), TransportError>>, options: WorkerOptions) -> Harness {
        let store = Arc::new(NativeCampaignStore::new(in_memory_campaign_db()));
        let transport = Arc::new(ScriptedTransport::with_script(script));
        let attachments = Arc::new(MemoryAttachments::default());
        let worker = CampaignWorker::new(
            store.clone(),
            transport.clone(),
            attachments.clone(),
            options,
        );
        Harness {
            store,
            transport,
            attachments,
            worker,
        }
    }

    fn rate() -> RateController {
        RateController::new(
            RateControlConfig {
                base_delay: 0.001,
                min_delay: 0.001,
                max_delay: 0.01,
                max_consecutive_backoffs: 5,
                recovery_window: Duration::from_secs(60),
            },
            Arc::new(PatternClassifier::default()),
        )
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    fn message(receipt: &str, entry: QueueEntry) -> ReceivedMessage {
        ReceivedMessage {
            receipt: receipt.into(),
            receive_count: 1,
            body: entry.to_json().unwrap(),
        }
    }

    async fn seed(store: &NativeCampaignStore, campaign: CampaignEntity, contacts: &[&str]) {
        store.save_campaign(campaign).await.unwrap();
        for address in contacts {
            store
                .save_contact(ContactEntity::new(*address).with_field("first_name", "Pat"))
                .await
                .unwrap();
        }
    }

    fn campaign(queued_count: u64) -> CampaignEntity {
        CampaignEntity::new(
            "c1",
            "Hello {{first_name}}",
            "<p>Hi {{first_name}}</p>",
            "news@example.com",
            queued_count,
        )
    }

    async fn load(store: &NativeCampaignStore) -> CampaignEntity {
        store.find_campaign("c1").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn mixed_outcomes_complete_the_campaign() {
        let h = harness(
            vec![
                Ok(()),
                Err(TransportError::new(Some("550".into()), "5.1.1 No such user")),
                Ok(()),
            ],
            options(0),
        );
        seed(
            &h.store,
            campaign(3),
            &["a@example.com", "b@example.com", "c@example.com"],
        )
        .await;

        let messages = vec![
            message("r1", QueueEntry::new("c1", "a@example.com", RecipientRole::Primary)),
            message("r2", QueueEntry::new("c1", "b@example.com", RecipientRole::Primary)),
            message("r3", QueueEntry::new("c1", "c@example.com", RecipientRole::Primary)),
        ];
        let mut rate = rate();
        let report = h.worker.run_invocation(messages, &mut rate, deadline()).await;

        assert_eq!(report.acked, vec!["r1", "r2", "r3"]);
        assert!(report.redeliver.is_empty());
        assert_eq!(report.summary.sent, 2);
        assert_eq!(report.summary.failed, 1);
        assert!(report.summary.total_delay_applied > 0.0);

        let campaign = load(&h.store).await;
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent_count, 2);
        assert_eq!(campaign.failed_count, 1);
        assert!(campaign.start_time.is_some());
        assert!(campaign.completed_at.is_some());
        assert_eq!(h.transport.delivered()[0].subject, "Hello Pat");
    }

    #[tokio::test]
    async fn throttles_back_off_and_leave_the_entry_queued() {
        let h = harness(
            vec![Err(TransportError::new(
                Some("421".into()),
                "4.7.0 Too many messages, slow down",
            ))],
            options(3),
        );
        seed(&h.store, campaign(1), &["a@example.com"]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![message("r1", QueueEntry::new("c1", "a@example.com", RecipientRole::Primary))],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.redeliver, vec!["r1"]);
        assert_eq!(report.summary.throttles_detected, 1);
        assert_eq!(rate.consecutive_backoffs(), 1);
        assert!((rate.current_delay() - 0.002).abs() < 1e-9);
        assert_eq!(h.transport.delivered().len(), 1);

        let campaign = load(&h.store).await;
        assert_eq!(campaign.sent_count + campaign.failed_count, 0);
        assert_eq!(campaign.status, CampaignStatus::Processing);
    }

    #[tokio::test]
    async fn missing_contacts_are_skipped_for_primary_only() {
        let h = harness(vec![], options(0));
        let mut campaign = campaign(2);
        campaign.cc_list = vec!["boss@example.com".into()];
        seed(&h.store, campaign, &[]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![
                    message(
                        "r1",
                        QueueEntry::new("c1", "gone@example.com", RecipientRole::Primary),
                    ),
                    message("r2", QueueEntry::new("c1", "boss@example.com", RecipientRole::Cc)),
                ],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.acked, vec!["r1", "r2"]);
        assert_eq!(report.summary.skipped, 1);
        assert_eq!(report.summary.sent, 1);

        let delivered = h.transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].destination.to, vec!["news@example.com".to_string()]);
        assert_eq!(delivered[0].destination.cc, vec!["boss@example.com".to_string()]);
        assert_eq!(delivered[0].subject, "Hello ");

        let campaign = load(&h.store).await;
        assert_eq!(campaign.sent_count, 1);
        assert_eq!(campaign.failed_count, 0);
        assert_eq!(campaign.status, CampaignStatus::Sending);
    }

    #[tokio::test]
    async fn cc_without_sender_fails_before_sending() {
        let h = harness(vec![], options(0));
        let mut campaign = campaign(1);
        campaign.sender_address = String::new();
        seed(&h.store, campaign, &["boss@example.com"]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![message("r1", QueueEntry::new("c1", "boss@example.com", RecipientRole::Cc))],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.acked, vec!["r1"]);
        assert_eq!(report.summary.failed, 1);
        assert!(h.transport.delivered().is_empty());

        let campaign = load(&h.store).await;
        assert_eq!(campaign.failed_count, 1);
        assert_eq!(campaign.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn malformed_and_orphaned_messages_are_dropped() {
        let h = harness(vec![], options(0));
        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![
                    ReceivedMessage {
                        receipt: "r1".into(),
                        receive_count: 1,
                        body: "not json".into(),
                    },
                    message(
                        "r2",
                        QueueEntry::new("missing", "a@example.com", RecipientRole::Primary),
                    ),
                ],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.acked, vec!["r1", "r2"]);
        assert_eq!(report.summary.skipped, 2);
        assert!(h.transport.delivered().is_empty());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_in_place() {
        let h = harness(
            vec![Err(TransportError::timeout("read timed out")), Ok(())],
            options(2),
        );
        seed(&h.store, campaign(1), &["a@example.com"]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![message("r1", QueueEntry::new("c1", "a@example.com", RecipientRole::Primary))],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.acked, vec!["r1"]);
        assert_eq!(h.transport.delivered().len(), 2);
        assert_eq!(rate.consecutive_backoffs(), 0);
        assert_eq!(load(&h.store).await.status, CampaignStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_transient_retries_are_redelivered() {
        let h = harness(
            vec![
                Err(TransportError::timeout("read timed out")),
                Err(TransportError::new(None, "Connection reset by peer")),
            ],
            options(1),
        );
        seed(&h.store, campaign(1), &["a@example.com"]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![message("r1", QueueEntry::new("c1", "a@example.com", RecipientRole::Primary))],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.redeliver, vec!["r1"]);
        assert_eq!(h.transport.delivered().len(), 2);
        let campaign = load(&h.store).await;
        assert_eq!(campaign.sent_count + campaign.failed_count, 0);
    }

    #[tokio::test]
    async fn nothing_starts_inside_the_drain_margin() {
        let h = harness(vec![], options(0));
        seed(&h.store, campaign(2), &["a@example.com", "b@example.com"]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![
                    message("r1", QueueEntry::new("c1", "a@example.com", RecipientRole::Primary)),
                    message("r2", QueueEntry::new("c1", "b@example.com", RecipientRole::Primary)),
                ],
                &mut rate,
                Instant::now() + Duration::from_millis(10),
            )
            .await;

        assert!(report.acked.is_empty());
        assert_eq!(report.redeliver, vec!["r1", "r2"]);
        assert!(h.transport.delivered().is_empty());
        assert_eq!(load(&h.store).await.status, CampaignStatus::Queued);
    }

    #[tokio::test]
    async fn large_attachments_slow_the_batch_down() {
        let h = harness(vec![Ok(())], options(0));
        h.attachments
            .store("ref/big", &[0u8; 16])
            .await
            .unwrap();
        let mut campaign = campaign(1);
        campaign.attachments = vec![Attachment {
            filename: "big.bin".into(),
            size_bytes: 7 * MB,
            storage_reference: "ref/big".into(),
            inline: false,
            content_type: None,
        }];
        seed(&h.store, campaign, &["a@example.com"]).await;

        let mut rate = rate();
        let report = h
            .worker
            .run_invocation(
                vec![message("r1", QueueEntry::new("c1", "a@example.com", RecipientRole::Primary))],
                &mut rate,
                deadline(),
            )
            .await;

        assert_eq!(report.acked, vec!["r1"]);
        assert_eq!(report.summary.attachment_delays_applied, 1);
        assert!((report.summary.total_delay_applied - 0.003).abs() < 1e-9);
    }
}
