// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::{sync::Arc, time::Duration};

use itertools::Itertools;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    generate_token, id,
    modules::{
        database::{batch_delete_impl, batch_insert_impl, batch_update_impl, manager::DB_MANAGER},
        error::{code::ErrorCode, MailcastResult},
        queue::{QueueEntry, QueueSource, ReceivedMessage},
        settings::cli::SETTINGS,
    },
    raise_error, utc_now,
};

#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[native_model(id = 3, version = 1)]
#[native_db]
pub struct QueueMessageEntity {
    #[primary_key]
    pub id: u64,
    /// JSON body exactly as enqueued.
    pub body: String,
    pub receive_count: u32,
    /// Unix epoch milliseconds after which the message can be received again.
    #[secondary_key]
    pub visible_at: i64,
    /// Receipt of the latest receive; only this receipt can acknowledge the message.
    pub receipt: Option<String>,
    pub created_at: i64,
}

impl QueueMessageEntity {
    pub fn new(body: String) -> Self {
        let now = utc_now!();
        Self {
            id: id!(64),
            body,
            receive_count: 0,
            visible_at: now,
            receipt: None,
            created_at: now,
        }
    }

    fn id_from_receipt(receipt: &str) -> Option<u64> {
        receipt.split_once(':')?.0.parse().ok()
    }
}

/// Queue with visibility timeouts and a dead-letter cut-off, stored in native_db.
#[derive(Clone)]
pub struct NativeDbQueue {
    db: Arc<Database<'static>>,
    max_receive_count: u32,
}

impl NativeDbQueue {
    pub fn new(db: Arc<Database<'static>>, max_receive_count: u32) -> Self {
        Self {
            db,
            max_receive_count: max_receive_count.max(1),
        }
    }

    pub fn from_manager() -> Self {
        Self::new(
            DB_MANAGER.queue_db().clone(),
            SETTINGS.mailcast_queue_max_receive_count,
        )
    }

    /// Drops visible messages that were already received `max_receive_count` times.
    async fn dead_letter(&self, now: i64) -> MailcastResult<()> {
        let max_receive_count = self.max_receive_count;
        let dropped = batch_delete_impl(&self.db, move |rw| {
            let visible: Vec<QueueMessageEntity> = rw
                .scan()
                .secondary(QueueMessageEntityKey::visible_at)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::QueueReceiveFailed))?
                .range(..=now)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::QueueReceiveFailed))?
                .try_collect()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::QueueReceiveFailed))?;
            Ok(visible
                .into_iter()
                .filter(|m| m.receive_count >= max_receive_count)
                .collect())
        })
        .await?;

        for message in dropped {
            warn!(
                "Dead-lettering queue message {} after {} receives: {}",
                message.id, message.receive_count, message.body
            );
        }
        Ok(())
    }
}

impl QueueSource for NativeDbQueue {
    async fn receive(
        &self,
        max: usize,
        visibility_timeout: Duration,
    ) -> MailcastResult<Vec<ReceivedMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let now = utc_now!();
        self.dead_letter(now).await?;

        let hidden_until = now + visibility_timeout.as_millis() as i64;
        let received = batch_update_impl(
            &self.db,
            move |rw| {
                let visible: Vec<QueueMessageEntity> = rw
                    .scan()
                    .secondary(QueueMessageEntityKey::visible_at)
                    .map_err(|e| {
                        raise_error!(format!("{:#?}", e), ErrorCode::QueueReceiveFailed)
                    })?
                    .range(..=now)
                    .map_err(|e| {
                        raise_error!(format!("{:#?}", e), ErrorCode::QueueReceiveFailed)
                    })?
                    .take(max)
                    .try_collect()
                    .map_err(|e| {
                        raise_error!(format!("{:#?}", e), ErrorCode::QueueReceiveFailed)
                    })?;
                Ok(visible)
            },
            move |current: &QueueMessageEntity| {
                let mut next = current.clone();
                next.receive_count = next.receive_count.saturating_add(1);
                next.visible_at = hidden_until;
                next.receipt = Some(format!("{}:{}", current.id, generate_token!(96)));
                next
            },
        )
        .await?;

        Ok(received
            .into_iter()
            .filter_map(|m| {
                m.receipt.map(|receipt| ReceivedMessage {
                    receipt,
                    receive_count: m.receive_count,
                    body: m.body,
                })
            })
            .collect())
    }

    async fn acknowledge(&self, receipts: Vec<String>) -> MailcastResult<usize> {
        if receipts.is_empty() {
            return Ok(0);
        }
        let deleted = batch_delete_impl(&self.db, move |rw| {
            let mut to_delete = Vec::with_capacity(receipts.len());
            for receipt in receipts {
                let Some(id) = QueueMessageEntity::id_from_receipt(&receipt) else {
                    debug!("Ignoring malformed receipt '{}'", receipt);
                    continue;
                };
                let current: Option<QueueMessageEntity> = rw.get().primary(id).map_err(|e| {
                    raise_error!(format!("{:#?}", e), ErrorCode::QueueAcknowledgeFailed)
                })?;
                match current {
                    Some(message) if message.receipt.as_deref() == Some(receipt.as_str()) => {
                        to_delete.push(message)
                    }
                    Some(_) => debug!("Ignoring stale receipt for queue message {}", id),
                    None => debug!("Queue message {} already acknowledged", id),
                }
            }
            Ok(to_delete)
        })
        .await?;
        Ok(deleted.len())
    }

    async fn send(&self, entries: Vec<QueueEntry>) -> MailcastResult<()> {
        let messages = entries
            .iter()
            .map(|entry| entry.to_json().map(QueueMessageEntity::new))
            .collect::<MailcastResult<Vec<_>>>()?;
        batch_insert_impl(&self.db, messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{database::manager::in_memory_queue_db, queue::RecipientRole};

    fn entries(n: usize) -> Vec<QueueEntry> {
        (0..n)
            .map(|i| {
                QueueEntry::new("c1", format!("user{}@example.com", i), RecipientRole::Primary)
            })
            .collect()
    }

    #[tokio::test]
    async fn received_messages_are_hidden_until_acknowledged() {
        let queue = NativeDbQueue::new(in_memory_queue_db(), 5);
        queue.send(entries(3)).await.unwrap();

        let first = queue.receive(2, Duration::from_secs(60)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|m| m.receive_count == 1));

        let second = queue.receive(10, Duration::from_secs(60)).await.unwrap();
        assert_eq!(second.len(), 1);

        let receipts = first.iter().map(|m| m.receipt.clone()).collect();
        assert_eq!(queue.acknowledge(receipts).await.unwrap(), 2);
        assert!(queue.receive(10, Duration::from_secs(60)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unacknowledged_messages_are_redelivered_after_timeout() {
        let queue = NativeDbQueue::new(in_memory_queue_db(), 5);
        queue.send(entries(1)).await.unwrap();

        let first = queue.receive(1, Duration::ZERO).await.unwrap();
        assert_eq!(first.len(), 1);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let again = queue.receive(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].receive_count, 2);
        assert_eq!(again[0].body, first[0].body);

        // The first receipt is stale now.
        assert_eq!(queue.acknowledge(vec![first[0].receipt.clone()]).await.unwrap(), 0);
        assert_eq!(queue.acknowledge(vec![again[0].receipt.clone()]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn messages_past_max_receive_count_are_dead_lettered() {
        let queue = NativeDbQueue::new(in_memory_queue_db(), 2);
        queue.send(entries(1)).await.unwrap();

        for _ in 0..2 {
            assert_eq!(queue.receive(1, Duration::ZERO).await.unwrap().len(), 1);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(queue.receive(1, Duration::ZERO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_receipts_are_ignored() {
        let queue = NativeDbQueue::new(in_memory_queue_db(), 2);
        assert_eq!(
            queue
                .acknowledge(vec!["garbage".into(), "12:nope".into()])
                .await
                .unwrap(),
            0
        );
    }
}
