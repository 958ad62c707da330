// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::modules::{
    campaign::store::{CampaignStore, ContactStore},
    common::signal::SIGNAL_MANAGER,
    delivery::{
        attachment::AttachmentStore,
        classifier::{ErrorClassifier, PatternClassifier},
        rate::{RateControlConfig, RateController},
        transport::EmailTransport,
    },
    error::MailcastResult,
    queue::QueueSource,
    settings::cli::Settings,
    worker::{report::BatchReport, CampaignWorker},
};

#[derive(Clone)]
pub struct DispatcherConfig {
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    pub invocation_timeout: Duration,
    pub rate: RateControlConfig,
    pub classifier: Arc<dyn ErrorClassifier>,
}

impl DispatcherConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            batch_size: settings.mailcast_queue_batch_size as usize,
            visibility_timeout: Duration::from_secs(
                settings.mailcast_queue_visibility_timeout_seconds,
            ),
            poll_interval: Duration::from_millis(settings.mailcast_queue_poll_interval_ms),
            invocation_timeout: Duration::from_secs(settings.mailcast_invocation_timeout_seconds),
            rate: RateControlConfig::from_settings(settings),
            classifier: Arc::new(PatternClassifier::default()),
        }
    }
}

/// Polls the queue and hands each batch to the worker as one invocation.
pub struct Dispatcher<Q, S, T, A> {
    queue: Arc<Q>,
    worker: Arc<CampaignWorker<S, T, A>>,
    config: DispatcherConfig,
}

impl<Q, S, T, A> Dispatcher<Q, S, T, A>
where
    Q: QueueSource + Send + Sync + 'static,
    S: CampaignStore + ContactStore + Send + Sync + 'static,
    T: EmailTransport + Send + Sync + 'static,
    A: AttachmentStore + Send + Sync + 'static,
{
    pub fn new(
        queue: Arc<Q>,
        worker: Arc<CampaignWorker<S, T, A>>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            worker,
            config,
        }
    }

    /// One invocation with a fresh rate controller. `None` when the queue was empty.
    pub async fn run_once(&self) -> MailcastResult<Option<BatchReport>> {
        let messages = self
            .queue
            .receive(self.config.batch_size, self.config.visibility_timeout)
            .await?;
        if messages.is_empty() {
            return Ok(None);
        }

        let deadline = Instant::now() + self.config.invocation_timeout;
        let mut rate =
            RateController::new(self.config.rate.clone(), self.config.classifier.clone());
        debug!("Starting invocation with {} message(s)", messages.len());
        let report = self.worker.run_invocation(messages, &mut rate, deadline).await;

        let acknowledged = self.queue.acknowledge(report.acked.clone()).await?;
        if acknowledged < report.acked.len() {
            warn!(
                "{} of {} receipts were stale at acknowledgement, \
                 those entries will be delivered again",
                report.acked.len() - acknowledged,
                report.acked.len()
            );
        }
        Ok(Some(report))
    }

    /// Runs `invocations` poll loops until the shutdown signal. A batch in
    /// progress is finished before a loop exits.
    pub fn start(self: Arc<Self>, invocations: u32) -> Vec<JoinHandle<()>> {
        (0..invocations.max(1))
            .map(|index| {
                let dispatcher = self.clone();
                tokio::spawn(async move { dispatcher.poll_loop(index).await })
            })
            .collect()
    }

    async fn poll_loop(&self, index: u32) {
        info!("Dispatcher {} started", index);
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = SIGNAL_MANAGER.subscribe();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.run_once().await {
                        Ok(Some(report)) => {
                            // A full batch means more is probably waiting.
                            let handled = report.acked.len() + report.redeliver.len();
                            if handled >= self.config.batch_size {
                                interval.reset_immediately();
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Dispatcher {} failed to process a batch: {:?}", index, e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Dispatcher {} shutting down due to shutdown signal", index);
                    break;
                }
            }
        }
        info!("Dispatcher {} stopped", index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{
        campaign::{contact::ContactEntity, entity::CampaignEntity, store::NativeCampaignStore},
        database::manager::{in_memory_campaign_db, in_memory_queue_db},
        delivery::transport::{
            tests::{MemoryAttachments, ScriptedTransport},
            TransportError,
        },
        queue::{native::NativeDbQueue, QueueEntry, RecipientRole},
        worker::WorkerOptions,
    };

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            batch_size: 10,
            visibility_timeout: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
            invocation_timeout: Duration::from_secs(30),
            rate: RateControlConfig {
                base_delay: 0.001,
                min_delay: 0.001,
                max_delay: 0.01,
                ..Default::default()
            },
            classifier: Arc::new(PatternClassifier::default()),
        }
    }

    #[tokio::test]
    async fn acknowledges_settled_entries_and_keeps_throttled_ones() {
        let store = Arc::new(NativeCampaignStore::new(in_memory_campaign_db()));
        store
            .save_campaign(CampaignEntity::new("c1", "Hi", "Body", "news@example.com", 2))
            .await
            .unwrap();
        for address in ["a@example.com", "b@example.com"] {
            store.save_contact(ContactEntity::new(address)).await.unwrap();
        }
        let queue = Arc::new(NativeDbQueue::new(in_memory_queue_db(), 5));
        queue
            .send(vec![
                QueueEntry::new("c1", "a@example.com", RecipientRole::Primary),
                QueueEntry::new("c1", "b@example.com", RecipientRole::Primary),
            ])
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(()),
            Err(TransportError::new(Some("Throttling".into()), "Rate exceeded")),
        ]));
        let worker = Arc::new(CampaignWorker::new(
            store.clone(),
            transport.clone(),
            Arc::new(MemoryAttachments::default()),
            WorkerOptions {
                drain_margin: Duration::from_secs(1),
                transport_retry_attempts: 0,
                transport_retry_pause: Duration::ZERO,
            },
        ));
        let dispatcher = Dispatcher::new(queue.clone(), worker, config());

        let report = dispatcher.run_once().await.unwrap().unwrap();
        assert_eq!(report.acked.len(), 1);
        assert_eq!(report.redeliver.len(), 1);
        assert_eq!(report.summary.throttles_detected, 1);

        let remaining = queue.receive(10, Duration::ZERO).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].receive_count, 2);
        let entry = QueueEntry::parse(&remaining[0].body).unwrap();
        let throttled = &transport.delivered()[1];
        assert_eq!(throttled.destination.to, vec![entry.contact_email]);

        let campaign = store.find_campaign("c1").await.unwrap().unwrap();
        assert_eq!(campaign.sent_count, 1);
    }

    #[tokio::test]
    async fn empty_queue_is_not_an_invocation() {
        let store = Arc::new(NativeCampaignStore::new(in_memory_campaign_db()));
        let queue = Arc::new(NativeDbQueue::new(in_memory_queue_db(), 5));
        let worker = Arc::new(CampaignWorker::new(
            store,
            Arc::new(ScriptedTransport::default()),
            Arc::new(MemoryAttachments::default()),
            WorkerOptions::from_settings(&Settings::new_for_test()),
        ));
        let dispatcher = Dispatcher::new(queue, worker, config());
        assert!(dispatcher.run_once().await.unwrap().is_none());
    }
}
